// ── Entity summarizer ──
//
// Raw entities come from many producers with no agreed property schema.
// Each semantic field is read through an ordered list of candidate
// sources; the first candidate that yields a usable value wins.

use std::sync::Arc;

use serde_json::{Map, Value};

use worldsync_api::{RawEntity, WorldSnapshot};

use crate::model::{EntitySummary, Position, SummaryMap};

/// Where a display name may come from.
#[derive(Debug, Clone, Copy)]
enum NameSource {
    Property(&'static str),
    EntityId,
}

const NAME_SOURCES: &[NameSource] = &[
    NameSource::Property("name"),
    NameSource::Property("id"),
    NameSource::Property("description"),
    NameSource::EntityId,
];

/// String-valued status properties, in priority order.
const STATUS_FIELDS: &[&str] = &["status", "state"];

const X_FIELDS: &[&str] = &["x", "pos_x", "lat", "lon"];
const Y_FIELDS: &[&str] = &["y", "pos_y", "lng", "long"];
const Z_FIELDS: &[&str] = &["z", "pos_z", "alt"];

/// Nested object consulted when no flat axis property is present.
const NESTED_POSITION: &str = "position";

// ── Public API ───────────────────────────────────────────────────────

/// Normalize one raw entity.
pub fn summarize_entity(entity: &RawEntity) -> EntitySummary {
    summarize_shared(Arc::new(entity.clone()))
}

/// Summarize every entity of a snapshot, preserving snapshot order.
///
/// A repeated id replaces the earlier record but keeps its slot.
pub fn summarize_snapshot(snapshot: &WorldSnapshot) -> SummaryMap {
    let mut map = SummaryMap::with_capacity(snapshot.entities.len());
    for entity in &snapshot.entities {
        let summary = summarize_shared(Arc::new(entity.clone()));
        map.insert(summary.id.clone(), Arc::new(summary));
    }
    map
}

fn summarize_shared(raw: Arc<RawEntity>) -> EntitySummary {
    let props = &raw.properties;
    EntitySummary {
        id: raw.id.clone(),
        entity_type: raw.entity_type.clone(),
        name: extract_name(&raw),
        status: extract_status(props),
        position: extract_position(props),
        raw: Arc::clone(&raw),
    }
}

// ── Extractors ───────────────────────────────────────────────────────

fn extract_name(entity: &RawEntity) -> String {
    NAME_SOURCES
        .iter()
        .find_map(|source| match source {
            NameSource::Property(key) => entity.properties.get(*key).and_then(name_value),
            NameSource::EntityId => Some(entity.id.clone()),
        })
        .unwrap_or_default()
}

fn name_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn extract_status(props: &Map<String, Value>) -> Option<String> {
    STATUS_FIELDS
        .iter()
        .find_map(|key| props.get(*key).and_then(Value::as_str))
        .map(str::to_lowercase)
}

fn extract_position(props: &Map<String, Value>) -> Option<Position> {
    let flat = Position::new(
        first_number(props, X_FIELDS),
        first_number(props, Y_FIELDS),
        first_number(props, Z_FIELDS),
    );
    if !flat.is_empty() {
        return Some(flat);
    }

    let nested = props.get(NESTED_POSITION)?.as_object()?;
    if !(nested.contains_key("x") && nested.contains_key("y")) {
        return None;
    }
    let position = Position::new(
        nested.get("x").and_then(coerce_number),
        nested.get("y").and_then(coerce_number),
        nested.get("z").and_then(coerce_number),
    );
    (!position.is_empty()).then_some(position)
}

fn first_number(props: &Map<String, Value>, candidates: &[&str]) -> Option<f64> {
    candidates
        .iter()
        .find_map(|key| props.get(*key).and_then(coerce_number))
}

/// Numbers and numeric strings; anything non-finite is treated as absent.
fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

// ── Domain model ──
//
// Normalized views over raw snapshot entities, and the typed change
// records the delta engine emits.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use worldsync_api::RawEntity;

/// Insertion-ordered `id → summary` map. Iteration follows snapshot order.
pub type SummaryMap = IndexMap<String, Arc<EntitySummary>>;

// ── Position ─────────────────────────────────────────────────────────

/// A point in world space. Any axis may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Position {
    pub fn new(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Self {
        Self { x, y, z }
    }

    pub fn xy(x: f64, y: f64) -> Self {
        Self::new(Some(x), Some(y), None)
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }

    pub(crate) fn axes(&self) -> [Option<f64>; 3] {
        [self.x, self.y, self.z]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let axis = |v: Option<f64>| v.map_or_else(|| "?".to_owned(), |v| format!("{v:.2}"));
        match self.z {
            Some(_) => write!(f, "({}, {}, {})", axis(self.x), axis(self.y), axis(self.z)),
            None => write!(f, "({}, {})", axis(self.x), axis(self.y)),
        }
    }
}

// ── EntitySummary ────────────────────────────────────────────────────

/// The fields of an entity the change tracker cares about.
///
/// Recomputed from scratch for every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip)]
    pub raw: Arc<RawEntity>,
}

// ── Delta ────────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Added,
    Removed,
    Status,
    Position,
}

/// One semantic change between two snapshots.
///
/// An id gets at most one `status` and one `position` delta per pass, and
/// never either of those alongside `added` or `removed`.
///
/// `added` carries only `current`, `removed` only `previous`; `status` and
/// `position` carry both summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub id: String,
    pub entity_type: String,
    pub kind: DeltaKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Arc<EntitySummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Arc<EntitySummary>>,
}

// ── Freshness ────────────────────────────────────────────────────────

/// How far the store's current snapshot can be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Freshness {
    /// Nothing has been loaded yet.
    #[default]
    Empty,
    /// Fetched or pushed from the server and not known to be outdated.
    Live,
    /// Last known data; a fetch failed or the connection dropped since.
    Stale { reason: String },
    /// Built-in demo data standing in for an unreachable server.
    Synthetic,
}

impl Freshness {
    pub fn stale(reason: impl Into<String>) -> Self {
        Self::Stale {
            reason: reason.into(),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl std::fmt::Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::Live => f.write_str("live"),
            Self::Stale { reason } => write!(f, "stale ({reason})"),
            Self::Synthetic => f.write_str("synthetic"),
        }
    }
}

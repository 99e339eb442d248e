//! Wire types for world-state snapshots.
//!
//! These mirror the JSON served by the snapshot endpoint and carried inline
//! by `snapshot` socket messages. Every field is defaulted so partially
//! populated records from older producers still decode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single entity exactly as the server sent it.
///
/// Immutable once received: each snapshot supersedes the previous one
/// wholesale, entities are never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    pub id: String,

    #[serde(rename = "type", default)]
    pub entity_type: String,

    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(default)]
    pub labels: Vec<String>,
}

impl RawEntity {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            properties: Map::new(),
            labels: Vec::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// A relationship between two entities. Carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
    #[serde(default)]
    pub id: Option<String>,

    pub source: String,

    pub target: String,

    #[serde(rename = "type", default)]
    pub edge_type: String,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A full point-in-time view of the world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(default)]
    pub entities: Vec<RawEntity>,

    #[serde(default)]
    pub edges: Vec<RawEdge>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub metadata: Value,
}

impl WorldSnapshot {
    pub fn from_entities(entities: Vec<RawEntity>) -> Self {
        Self {
            entities,
            ..Self::default()
        }
    }

    /// Try to read an inline snapshot out of a message payload.
    ///
    /// Returns `None` unless the payload is an object with an `entities`
    /// array; a bare notification like `{"changed": 3}` is not a snapshot.
    pub fn from_payload(data: &Value) -> Option<Self> {
        if !data.get("entities").is_some_and(Value::is_array) {
            return None;
        }
        match serde_json::from_value(data.clone()) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::debug!(error = %e, "inline snapshot payload did not decode");
                None
            }
        }
    }
}

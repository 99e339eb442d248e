// Built-in demo world, served as `synthetic` data when the server cannot be
// reached on first load.

use serde_json::json;

use worldsync_api::{RawEdge, RawEntity, WorldSnapshot};

/// A small fixed world: two agents, a task, and the places they occupy.
pub fn demo_snapshot() -> WorldSnapshot {
    let entities = vec![
        RawEntity::new("demo-agent-scout", "agent")
            .with_property("name", json!("Scout"))
            .with_property("status", json!("exploring"))
            .with_property("x", json!(12.0))
            .with_property("y", json!(-4.5)),
        RawEntity::new("demo-agent-builder", "agent")
            .with_property("name", json!("Builder"))
            .with_property("status", json!("idle"))
            .with_property("position", json!({"x": 0.0, "y": 0.0, "z": 1.0})),
        RawEntity::new("demo-task-survey", "task")
            .with_property("description", json!("Survey the north ridge"))
            .with_property("state", json!("Pending")),
        RawEntity::new("demo-location-base", "location")
            .with_property("name", json!("Base Camp"))
            .with_property("lat", json!(0.0))
            .with_property("lng", json!(0.0)),
        RawEntity::new("demo-location-ridge", "location")
            .with_property("name", json!("North Ridge"))
            .with_property("pos_x", json!("15"))
            .with_property("pos_y", json!("40")),
    ];

    let edges = vec![
        edge("demo-agent-scout", "demo-location-ridge", "heading_to"),
        edge("demo-agent-builder", "demo-location-base", "located_at"),
        edge("demo-agent-scout", "demo-task-survey", "assigned"),
    ];

    WorldSnapshot {
        entities,
        edges,
        timestamp: None,
        metadata: json!({"source": "demo"}),
    }
}

fn edge(source: &str, target: &str, edge_type: &str) -> RawEdge {
    RawEdge {
        id: Some(format!("{source}:{edge_type}:{target}")),
        source: source.into(),
        target: target.into(),
        edge_type: edge_type.into(),
        properties: serde_json::Map::new(),
    }
}

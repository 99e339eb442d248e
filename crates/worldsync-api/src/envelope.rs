//! The JSON envelope exchanged over the world-state socket.
//!
//! Every frame in either direction has the shape
//! `{ "type": "...", "data": ..., "timestamp": ... }`. Fields beyond the
//! core set are captured in [`Envelope::extra`] so nothing the server sends
//! is silently dropped (`pong` frames carry a `connection_id`, for example).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString, IntoStaticStr};

// ── MessageKind ──────────────────────────────────────────────────────

/// Known values of the envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    /// Full world snapshot, possibly inline in `data`.
    Snapshot,
    /// Something changed upstream; refetch.
    Update,
    /// Graph topology changed upstream; refetch.
    GraphUpdate,
    Log,
    Logs,
    Telemetry,
    PersonaEntry,
    /// Client → server liveness check.
    Ping,
    /// Server → client liveness answer.
    Pong,
    /// Client → server stream registration, sent on every open.
    Subscribe,
    /// Anything this client does not recognize.
    Other,
}

// ── Envelope ─────────────────────────────────────────────────────────

/// A single message on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Raw `type` discriminator, kept verbatim so unknown types survive.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Message payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Server timestamp. Usually an ISO-8601 string, but some producers
    /// send epoch numbers, so the raw value is kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,

    /// All remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// An envelope with only a `type`.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            message_type: <&'static str>::from(kind).to_owned(),
            data: None,
            timestamp: None,
            extra: Map::new(),
        }
    }

    pub fn ping() -> Self {
        Self::new(MessageKind::Ping)
    }

    pub fn subscribe() -> Self {
        Self::new(MessageKind::Subscribe)
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Classify the raw `type` field.
    pub fn kind(&self) -> MessageKind {
        self.message_type.parse().unwrap_or(MessageKind::Other)
    }

    /// `timestamp` as a string, when the server sent one.
    pub fn timestamp_str(&self) -> Option<&str> {
        self.timestamp.as_ref().and_then(Value::as_str)
    }

    /// `connection_id` carried by `pong` frames.
    pub fn connection_id(&self) -> Option<&str> {
        self.extra.get("connection_id").and_then(Value::as_str)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_pong_with_connection_id() {
        let env =
            Envelope::parse(r#"{"type":"pong","timestamp":"t1","connection_id":"c-42"}"#).unwrap();
        assert_eq!(env.kind(), MessageKind::Pong);
        assert_eq!(env.timestamp_str(), Some("t1"));
        assert_eq!(env.connection_id(), Some("c-42"));
        assert!(env.data.is_none());
    }

    #[test]
    fn unknown_type_is_other_but_preserved() {
        let env = Envelope::parse(r#"{"type":"weather","data":{"rain":true}}"#).unwrap();
        assert_eq!(env.kind(), MessageKind::Other);
        assert_eq!(env.message_type, "weather");
        assert_eq!(env.data, Some(json!({"rain": true})));
    }

    #[test]
    fn snake_case_kinds_parse() {
        for (raw, kind) in [
            ("graph_update", MessageKind::GraphUpdate),
            ("persona_entry", MessageKind::PersonaEntry),
            ("logs", MessageKind::Logs),
            ("telemetry", MessageKind::Telemetry),
        ] {
            let env = Envelope::parse(&json!({ "type": raw }).to_string()).unwrap();
            assert_eq!(env.kind(), kind, "{raw}");
        }
    }

    #[test]
    fn numeric_timestamp_is_accepted() {
        let env = Envelope::parse(r#"{"type":"pong","timestamp":1718000000.5}"#).unwrap();
        assert_eq!(env.kind(), MessageKind::Pong);
        assert!(env.timestamp_str().is_none());
        assert!(env.timestamp.is_some());
    }

    #[test]
    fn missing_type_is_rejected() {
        assert!(Envelope::parse(r#"{"data":1}"#).is_err());
        assert!(Envelope::parse("not json at all").is_err());
    }

    #[test]
    fn outbound_frames_serialize_minimally() {
        let text = serde_json::to_string(&Envelope::subscribe()).unwrap();
        assert_eq!(text, r#"{"type":"subscribe"}"#);

        let text = serde_json::to_string(&Envelope::ping()).unwrap();
        assert_eq!(text, r#"{"type":"ping"}"#);
    }
}

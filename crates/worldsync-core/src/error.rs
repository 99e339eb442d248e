// ── Core error types ──
//
// User-facing errors from worldsync-core. Consumers never see raw reqwest
// or serde failures; the `From<worldsync_api::Error>` impl translates
// wire-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach world server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("World server request timed out")]
    Timeout,

    // ── Snapshot errors ──────────────────────────────────────────────
    #[error("Snapshot source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Snapshot endpoint returned HTTP {status}: {message}")]
    Api { message: String, status: u16 },

    #[error("Invalid snapshot payload: {message}")]
    InvalidSnapshot { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("World sync is not running")]
    NotRunning,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

}

impl CoreError {
    /// Worth retrying on the next refresh.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout | Self::SourceUnavailable { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidSnapshot { .. } | Self::NotRunning | Self::Config { .. } => false,
        }
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<worldsync_api::Error> for CoreError {
    fn from(err: worldsync_api::Error) -> Self {
        match err {
            worldsync_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else if let Some(status) = e.status() {
                    CoreError::Api {
                        message: e.to_string(),
                        status: status.as_u16(),
                    }
                } else {
                    CoreError::SourceUnavailable {
                        reason: e.to_string(),
                    }
                }
            }
            worldsync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            worldsync_api::Error::Http { status, body } => CoreError::Api {
                message: body,
                status,
            },
            worldsync_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            worldsync_api::Error::Deserialization { message, body: _ } => {
                CoreError::InvalidSnapshot { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_to_api_error() {
        let err = CoreError::from(worldsync_api::Error::Http {
            status: 502,
            body: "bad gateway".into(),
        });
        assert!(matches!(err, CoreError::Api { status: 502, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn deserialization_maps_to_invalid_snapshot() {
        let err = CoreError::from(worldsync_api::Error::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        });
        assert!(matches!(err, CoreError::InvalidSnapshot { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn websocket_failure_maps_to_connection_failed() {
        let err = CoreError::from(worldsync_api::Error::WebSocketConnect("refused".into()));
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn not_found_is_permanent() {
        let err = CoreError::from(worldsync_api::Error::Http {
            status: 404,
            body: String::new(),
        });
        assert!(!err.is_transient());
    }
}

// ── Runtime sync configuration ──
//
// Describes *where* the world server lives and how aggressively to keep
// up with it. Built by the CLI (or any embedder) and handed in; core
// never reads config files.

use std::time::Duration;

use url::Url;

use worldsync_api::transport::{DEFAULT_PING_INTERVAL, ReconnectConfig, TransportConfig};

use crate::highlight::{DEFAULT_HIGHLIGHT_TTL, DEFAULT_SWEEP_INTERVAL};

/// Preset polling intervals offered to users.
pub const REFRESH_PRESETS: [Duration; 3] = [
    Duration::from_millis(5000),
    Duration::from_millis(15_000),
    Duration::from_millis(60_000),
];

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one [`WorldSync`](crate::WorldSync).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Broadcast socket (e.g., `ws://localhost:8000/ws`).
    pub socket_url: Url,
    /// Full-snapshot REST endpoint.
    pub snapshot_url: Url,
    pub reconnect: ReconnectConfig,
    pub ping_interval: Duration,
    /// Timeout for a single snapshot request.
    pub request_timeout: Duration,
    /// Polling period. `None` disables polling.
    pub refresh_interval: Option<Duration>,
    pub highlight_ttl: Duration,
    pub sweep_interval: Duration,
    /// Substitute built-in demo data when the very first fetch fails.
    pub demo_fallback: bool,
}

impl SyncConfig {
    /// Defaults for everything except the two endpoints.
    pub fn new(socket_url: Url, snapshot_url: Url) -> Self {
        Self {
            socket_url,
            snapshot_url,
            reconnect: ReconnectConfig::default(),
            ping_interval: DEFAULT_PING_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_interval: None,
            highlight_ttl: DEFAULT_HIGHLIGHT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            demo_fallback: false,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            url: self.socket_url.clone(),
            reconnect: self.reconnect.clone(),
            ping_interval: self.ping_interval,
        }
    }
}

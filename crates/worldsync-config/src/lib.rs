//! Shared configuration for worldsync tools.
//!
//! TOML file plus `WORLDSYNC_*` environment overrides, layered with
//! `figment`, and translation to [`worldsync_core::SyncConfig`]. The core
//! crate never reads files; everything it needs arrives through here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use worldsync_core::{ReconnectConfig, SyncConfig};

/// Environment prefix. `__` separates nested keys, so
/// `WORLDSYNC_SERVER__SOCKET_URL` sets `server.socket_url`.
pub const ENV_PREFIX: &str = "WORLDSYNC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub reconnect: ReconnectSection,

    #[serde(default)]
    pub sync: SyncSection,

    /// CLI presentation defaults.
    #[serde(default)]
    pub defaults: Defaults,
}

/// Where the world server lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerSection {
    /// Broadcast socket URL (`ws://` or `wss://`).
    #[serde(default = "default_socket_url")]
    pub socket_url: String,

    /// Full-snapshot REST endpoint (`http://` or `https://`).
    #[serde(default = "default_snapshot_url")]
    pub snapshot_url: String,

    /// Per-request timeout for snapshot fetches, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            socket_url: default_socket_url(),
            snapshot_url: default_snapshot_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_socket_url() -> String {
    "ws://localhost:8000/ws".into()
}
fn default_snapshot_url() -> String {
    "http://localhost:8000/api/snapshot".into()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Socket reconnect backoff.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectSection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    20
}

/// Heartbeat, polling and highlight timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncSection {
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Polling period in milliseconds. Absent or `0` disables polling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval_ms: Option<u64>,

    #[serde(default = "default_highlight_ttl_ms")]
    pub highlight_ttl_ms: u64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Serve built-in demo data when the first fetch fails.
    #[serde(default)]
    pub demo_fallback: bool,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            refresh_interval_ms: None,
            highlight_ttl_ms: default_highlight_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            demo_fallback: false,
        }
    }
}

fn default_ping_interval_ms() -> u64 {
    10_000
}
fn default_highlight_ttl_ms() -> u64 {
    8000
}
fn default_sweep_interval_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

// ── Translation to SyncConfig ───────────────────────────────────────

impl Config {
    /// Validate and convert into the runtime configuration.
    pub fn to_sync_config(&self) -> Result<SyncConfig, ConfigError> {
        let socket_url = parse_url("server.socket_url", &self.server.socket_url, &["ws", "wss"])?;
        let snapshot_url = parse_url(
            "server.snapshot_url",
            &self.server.snapshot_url,
            &["http", "https"],
        )?;

        let reconnect = ReconnectConfig {
            base_delay: positive_ms("reconnect.base_delay_ms", self.reconnect.base_delay_ms)?,
            max_delay: positive_ms("reconnect.max_delay_ms", self.reconnect.max_delay_ms)?,
            max_attempts: self.reconnect.max_attempts,
        };
        if reconnect.max_delay < reconnect.base_delay {
            return Err(ConfigError::validation(
                "reconnect.max_delay_ms",
                "must not be smaller than base_delay_ms",
            ));
        }

        let mut config = SyncConfig::new(socket_url, snapshot_url);
        config.reconnect = reconnect;
        config.request_timeout =
            positive_ms("server.request_timeout_ms", self.server.request_timeout_ms)?;
        config.ping_interval = positive_ms("sync.ping_interval_ms", self.sync.ping_interval_ms)?;
        config.refresh_interval = self
            .sync
            .refresh_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        config.highlight_ttl = positive_ms("sync.highlight_ttl_ms", self.sync.highlight_ttl_ms)?;
        config.sweep_interval =
            positive_ms("sync.sweep_interval_ms", self.sync.sweep_interval_ms)?;
        config.demo_fallback = self.sync.demo_fallback;
        Ok(config)
    }
}

fn parse_url(field: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::validation(field, format!("{raw}: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::validation(
            field,
            format!("expected {} URL, got '{raw}'", schemes.join(" or ")),
        ));
    }
    Ok(url)
}

fn positive_ms(field: &str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::validation(field, "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "worldsync", "worldsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("worldsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered provider: defaults, then the TOML file, then environment.
///
/// A missing file contributes nothing.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full Config.
///
/// With an explicit `path` the file must exist; otherwise the platform
/// config path is used and may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails for any reason.
pub fn load_config_or_default(path: Option<&Path>) -> Config {
    load_config(path).unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

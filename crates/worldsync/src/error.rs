//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use worldsync_config::ConfigError;
use worldsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const DATA: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the world server at {url}")]
    #[diagnostic(
        code(worldsync::connection_failed),
        help(
            "Check that the server is running and accessible.\n\
             URL: {url}\n\
             Try: worldsync snapshot --demo"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Snapshot source unavailable: {reason}")]
    #[diagnostic(
        code(worldsync::source_unavailable),
        help("The server may be restarting. Retry, or pass --demo-fallback to watch.")
    )]
    SourceUnavailable { reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(worldsync::timeout),
        help("Raise server.request_timeout_ms or check server responsiveness.")
    )]
    Timeout,

    // ── API ──────────────────────────────────────────────────────────
    #[error("Server error ({status}): {message}")]
    #[diagnostic(code(worldsync::api_error))]
    Api { status: u16, message: String },

    #[error("Snapshot endpoint not found")]
    #[diagnostic(
        code(worldsync::not_found),
        help("Check server.snapshot_url.\nCurrent value: {url}")
    )]
    EndpointNotFound { url: String },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Invalid snapshot: {message}")]
    #[diagnostic(
        code(worldsync::invalid_snapshot),
        help("The server answered with something that is not a snapshot.")
    )]
    InvalidSnapshot { message: String },

    #[error("Invalid snapshot file {path}")]
    #[diagnostic(
        code(worldsync::invalid_snapshot_file),
        help("A snapshot is a JSON object with an `entities` array.")
    )]
    InvalidSnapshotFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(worldsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(
        code(worldsync::no_config),
        help(
            "Create one with: worldsync config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(worldsync::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(worldsync::config))]
    Config(Box<ConfigError>),

    #[error("Internal error: {message}")]
    #[diagnostic(code(worldsync::internal))]
    Internal { message: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(worldsync::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::SourceUnavailable { .. } => {
                exit_code::CONNECTION
            }
            Self::Timeout => exit_code::TIMEOUT,
            Self::EndpointNotFound { .. } | Self::NoConfig { .. } => exit_code::NOT_FOUND,
            Self::InvalidSnapshot { .. } | Self::InvalidSnapshotFile { .. } | Self::Json(_) => {
                exit_code::DATA
            }
            Self::Validation { .. } | Self::ConfigExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NotFound { path } => Self::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed {
                url,
                source: reason.into(),
            },
            CoreError::Timeout => Self::Timeout,
            CoreError::SourceUnavailable { reason } => Self::SourceUnavailable { reason },
            CoreError::Api { message, status } => Self::Api { status, message },
            CoreError::InvalidSnapshot { message } => Self::InvalidSnapshot { message },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::NotRunning => Self::Internal {
                message: "sync is not running".into(),
            },
        }
    }
}

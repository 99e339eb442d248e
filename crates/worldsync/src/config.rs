//! CLI configuration: thin wrapper around `worldsync_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (`--config`, `--socket-url`, `--snapshot-url`, `--output`, `--color`).

use std::path::PathBuf;

use clap::ValueEnum;

use worldsync_core::SyncConfig;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use worldsync_config::{Config, config_path, load_config, save_config};

/// The config file in effect: `--config` if given, else the platform path.
pub fn active_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load the layered config for this invocation.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(load_config(global.config.as_deref())?)
}

/// Translate config plus flag overrides into a `SyncConfig`.
///
/// Flags win over environment, which wins over the file.
pub fn resolve_sync_config(cfg: &Config, global: &GlobalOpts) -> Result<SyncConfig, CliError> {
    let mut cfg = cfg.clone();
    if let Some(ref url) = global.socket_url {
        cfg.server.socket_url.clone_from(url);
    }
    if let Some(ref url) = global.snapshot_url {
        cfg.server.snapshot_url.clone_from(url);
    }
    Ok(cfg.to_sync_config()?)
}

/// `--output` if given, else `defaults.output`, else table.
pub fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&cfg.defaults.output, true).unwrap_or_else(|_| {
            tracing::warn!(value = %cfg.defaults.output, "unknown defaults.output, using table");
            OutputFormat::Table
        })
    })
}

/// `--color` if given, else `defaults.color`, else auto.
pub fn color_mode(global: &GlobalOpts, cfg: &Config) -> ColorMode {
    global.color.unwrap_or_else(|| {
        ColorMode::from_str(&cfg.defaults.color, true).unwrap_or(ColorMode::Auto)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["worldsync"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["config", "path"]);
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn url_flags_override_config() {
        let g = global(&["--socket-url", "wss://world.example/ws"]);
        let sync = resolve_sync_config(&Config::default(), &g).unwrap();
        assert_eq!(sync.socket_url.as_str(), "wss://world.example/ws");
        assert_eq!(sync.snapshot_url.as_str(), "http://localhost:8000/api/snapshot");
    }

    #[test]
    fn invalid_flag_url_is_a_validation_error() {
        let g = global(&["--snapshot-url", "ftp://world.example/snap"]);
        let err = resolve_sync_config(&Config::default(), &g).unwrap_err();
        assert!(matches!(err, CliError::Validation { field, .. } if field == "server.snapshot_url"));
    }

    #[test]
    fn output_falls_back_to_config_default() {
        let mut cfg = Config::default();
        cfg.defaults.output = "json-compact".into();
        assert_eq!(output_format(&global(&[]), &cfg), OutputFormat::JsonCompact);
        assert_eq!(output_format(&global(&["-o", "yaml"]), &cfg), OutputFormat::Yaml);

        cfg.defaults.output = "fancy".into();
        assert_eq!(output_format(&global(&[]), &cfg), OutputFormat::Table);
    }

    #[test]
    fn color_falls_back_to_config_default() {
        let mut cfg = Config::default();
        cfg.defaults.color = "never".into();
        assert_eq!(color_mode(&global(&[]), &cfg), ColorMode::Never);
        assert_eq!(color_mode(&global(&["--color", "always"]), &cfg), ColorMode::Always);
    }
}

//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => show(global),
        ConfigCommand::Path => {
            output::print_output(&config::active_path(global).display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Init { force } => init(global, force),
    }
}

/// Print the effective config after all layers, validated.
fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    // Surface validation problems here rather than at the next `watch`.
    config::resolve_sync_config(&cfg, global)?;

    let format = config::output_format(global, &cfg);
    let rendered = output::render_single(format, &cfg, to_toml, |c| to_toml(c).unwrap_or_default())?;
    output::print_output(rendered.trim_end(), global.quiet);
    Ok(())
}

fn to_toml(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(cfg).map_err(|e| CliError::Internal {
        message: format!("TOML serialization failed: {e}"),
    })
}

fn init(global: &GlobalOpts, force: bool) -> Result<(), CliError> {
    let path = config::active_path(global);
    if path.exists() && !force {
        return Err(CliError::ConfigExists {
            path: path.display().to_string(),
        });
    }
    config::save_config(&Config::default(), &path)?;
    tracing::info!(path = %path.display(), "wrote default config");
    output::print_output(&format!("Wrote {}", path.display()), global.quiet);
    Ok(())
}

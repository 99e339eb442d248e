//! Clap derive structures for the `worldsync` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// worldsync -- mirror, watch and diff a live world-state graph
#[derive(Debug, Parser)]
#[command(
    name = "worldsync",
    version,
    about = "Keep a local view of a world-state graph in sync",
    long_about = "Follows a world server's broadcast socket, refetches snapshots on\n\
        change, and reports what appeared, disappeared, changed status or moved.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "WORLDSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Broadcast socket URL (overrides config)
    #[arg(long, global = true)]
    pub socket_url: Option<String>,

    /// Snapshot endpoint URL (overrides config)
    #[arg(long, global = true)]
    pub snapshot_url: Option<String>,

    /// Output format (defaults to the config's `defaults.output`)
    #[arg(long, short = 'o', global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the live world and print changes until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Fetch one snapshot and list its entities
    #[command(alias = "snap")]
    Snapshot(SnapshotArgs),

    /// Compare two snapshot files offline
    Diff(DiffArgs),

    /// Inspect or create the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Also poll on a timer (e.g. 5s, 15s, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub refresh: Option<Duration>,

    /// Fall back to built-in demo data if the server is unreachable
    #[arg(long)]
    pub demo_fallback: bool,

    /// Stop after this long instead of waiting for Ctrl-C
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,
}

// ── Snapshot ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Use the built-in demo world instead of fetching
    #[arg(long)]
    pub demo: bool,

    /// Only list entities of this type
    #[arg(long, short = 't')]
    pub entity_type: Option<String>,

    /// Print the raw snapshot body instead of summaries
    #[arg(long, conflicts_with = "entity_type")]
    pub raw: bool,
}

// ── Diff ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Earlier snapshot (JSON file)
    pub previous: PathBuf,

    /// Later snapshot (JSON file)
    pub current: PathBuf,

    /// Exit with status 1 when the snapshots differ
    #[arg(long)]
    pub exit_code: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (defaults, file and environment)
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Value parsers ────────────────────────────────────────────────────

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(raw).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("must be greater than zero".into());
    }
    Ok(duration)
}

//! Diff command: offline delta between two snapshot files.

use std::path::Path;

use tabled::Tabled;

use worldsync_core::{
    Delta, DeltaKind, EntitySummary, WorldSnapshot, compute_world_deltas, summarize_snapshot,
};

use crate::cli::{DiffArgs, GlobalOpts};
use crate::config;
use crate::error::{CliError, exit_code};
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeltaRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    entity_type: String,
    #[tabled(rename = "Before")]
    before: String,
    #[tabled(rename = "After")]
    after: String,
    #[tabled(rename = "Change")]
    label: String,
}

fn delta_row(d: &Delta) -> DeltaRow {
    DeltaRow {
        kind: d.kind.to_string(),
        id: d.id.clone(),
        entity_type: d.entity_type.clone(),
        before: side(d.kind, d.previous.as_deref()),
        after: side(d.kind, d.current.as_deref()),
        label: d.label.clone(),
    }
}

/// The part of a summary a delta of `kind` is about.
fn side(kind: DeltaKind, summary: Option<&EntitySummary>) -> String {
    let Some(summary) = summary else {
        return "-".into();
    };
    match kind {
        DeltaKind::Position => summary.position.map_or_else(|| "-".into(), |p| p.to_string()),
        DeltaKind::Added | DeltaKind::Removed | DeltaKind::Status => summary
            .status
            .clone()
            .unwrap_or_else(|| summary.name.clone()),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &DiffArgs, global: &GlobalOpts) -> Result<i32, CliError> {
    let cfg = config::load(global)?;
    let format = config::output_format(global, &cfg);
    let color = output::should_color(config::color_mode(global, &cfg));

    let previous = summarize_snapshot(&read_snapshot(&args.previous)?);
    let current = summarize_snapshot(&read_snapshot(&args.current)?);
    let deltas = compute_world_deltas(&previous, &current);
    tracing::debug!(
        previous = previous.len(),
        current = current.len(),
        deltas = deltas.len(),
        "compared snapshots"
    );

    let rendered = output::render_list(format, &deltas, delta_row, |d| {
        format!("{} {}", output::paint_kind(d.kind, color), d.label)
    })?;
    output::print_output(&rendered, global.quiet);

    if args.exit_code && !deltas.is_empty() {
        return Ok(exit_code::GENERAL);
    }
    Ok(exit_code::SUCCESS)
}

pub(crate) fn read_snapshot(path: &Path) -> Result<WorldSnapshot, CliError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| CliError::InvalidSnapshotFile {
        path: path.display().to_string(),
        source,
    })
}

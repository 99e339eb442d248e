//! Snapshot command: fetch once and list entity summaries.

use std::sync::Arc;

use tabled::Tabled;

use worldsync_core::{
    CoreError, EntitySummary, HttpSnapshotSource, SnapshotSource, WorldSnapshot, demo_snapshot,
    summarize_snapshot,
};

use crate::cli::{GlobalOpts, SnapshotArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub(crate) struct EntityRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    entity_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Position")]
    position: String,
}

impl From<&EntitySummary> for EntityRow {
    fn from(s: &EntitySummary) -> Self {
        Self {
            id: s.id.clone(),
            entity_type: s.entity_type.clone(),
            name: s.name.clone(),
            status: s.status.clone().unwrap_or_else(|| "-".into()),
            position: s.position.map_or_else(|| "-".into(), |p| p.to_string()),
        }
    }
}

fn line(s: &EntitySummary) -> String {
    format!("{}\t{}\t{}", s.id, s.entity_type, s.name)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: SnapshotArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let format = config::output_format(global, &cfg);

    let snapshot = if args.demo {
        demo_snapshot()
    } else {
        fetch(&cfg, global).await?
    };

    if args.raw {
        let rendered = output::render_single(
            format,
            &snapshot,
            |s| output::render_json(s, false),
            |s| output::render_json(s, true).unwrap_or_default(),
        )?;
        output::print_output(&rendered, global.quiet);
        return Ok(());
    }

    let summaries = summarize_snapshot(&snapshot);
    let list: Vec<Arc<EntitySummary>> = summaries
        .values()
        .filter(|s| {
            args.entity_type
                .as_deref()
                .is_none_or(|t| s.entity_type.eq_ignore_ascii_case(t))
        })
        .cloned()
        .collect();
    tracing::debug!(total = summaries.len(), shown = list.len(), "summarized snapshot");

    let rendered = output::render_list(
        format,
        &list,
        |s| EntityRow::from(s.as_ref()),
        |s| line(s),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

async fn fetch(cfg: &config::Config, global: &GlobalOpts) -> Result<WorldSnapshot, CliError> {
    let sync = config::resolve_sync_config(cfg, global)?;
    let source = HttpSnapshotSource::new(sync.snapshot_url.clone(), sync.request_timeout)?;
    tracing::info!(source = %source.describe(), "fetching snapshot");

    source.fetch().await.map_err(|e| match e {
        CoreError::Api { status: 404, .. } => CliError::EndpointNotFound {
            url: sync.snapshot_url.to_string(),
        },
        other => other.into(),
    })
}

//! Watch command: run the sync loop and print changes until interrupted.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use worldsync_api::transport::TungsteniteConnector;
use worldsync_core::{
    ConnectionState, Delta, Freshness, HttpSnapshotSource, SnapshotSource, WorldSync,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Events ──────────────────────────────────────────────────────────

/// One line of structured watch output.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent<'a> {
    Loaded {
        entities: usize,
        freshness: &'a Freshness,
    },
    Connection {
        state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attempt: Option<u32>,
    },
    Freshness {
        freshness: &'a Freshness,
    },
    Delta {
        #[serde(flatten)]
        delta: &'a Delta,
    },
}

/// Writes watch events in the selected format.
struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn emit(&self, event: &WatchEvent<'_>) -> Result<(), CliError> {
        let rendered = match self.format {
            OutputFormat::Table | OutputFormat::Plain => self.human(event),
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(event, true)?,
            OutputFormat::Yaml => format!("---\n{}", output::render_yaml(event)?.trim_end()),
        };
        output::print_output(&rendered, self.quiet);
        Ok(())
    }

    fn human(&self, event: &WatchEvent<'_>) -> String {
        let now = chrono::Local::now().format("%H:%M:%S");
        match event {
            WatchEvent::Loaded {
                entities,
                freshness,
            } => format!("{now}  loaded {entities} entities ({freshness})"),
            WatchEvent::Connection { state, attempt } => match attempt {
                Some(n) => format!("{now}  connection {state} (attempt {n})"),
                None => format!("{now}  connection {state}"),
            },
            WatchEvent::Freshness { freshness } => format!("{now}  data {freshness}"),
            WatchEvent::Delta { delta } => format!(
                "{now}  {} {}",
                output::paint_kind(delta.kind, self.color),
                delta.label
            ),
        }
    }

    fn connection(&self, state: &ConnectionState) -> Result<(), CliError> {
        let attempt = match state {
            ConnectionState::Reconnecting { attempt } => Some(*attempt),
            _ => None,
        };
        self.emit(&WatchEvent::Connection {
            state: state.to_string(),
            attempt,
        })
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let mut sync_config = config::resolve_sync_config(&cfg, global)?;
    if args.refresh.is_some() {
        sync_config.refresh_interval = args.refresh;
    }
    sync_config.demo_fallback |= args.demo_fallback;

    let printer = Printer {
        format: config::output_format(global, &cfg),
        color: output::should_color(config::color_mode(global, &cfg)),
        quiet: global.quiet,
    };

    let source: Arc<dyn SnapshotSource> = Arc::new(HttpSnapshotSource::new(
        sync_config.snapshot_url.clone(),
        sync_config.request_timeout,
    )?);
    let sync = WorldSync::new(sync_config, source, TungsteniteConnector);
    let mut states = sync.connection_state();

    sync.start().await?;

    let store = Arc::clone(sync.store());
    let mut deltas = store.deltas();
    let mut freshness = store.subscribe_freshness();
    printer.emit(&WatchEvent::Loaded {
        entities: store.entity_count(),
        freshness: &store.freshness(),
    })?;

    let result = run_loop(
        &printer,
        &mut states,
        &mut deltas,
        &mut freshness,
        args.duration,
    )
    .await;

    sync.stop().await;
    result
}

async fn run_loop(
    printer: &Printer,
    states: &mut tokio::sync::watch::Receiver<ConnectionState>,
    deltas: &mut tokio::sync::broadcast::Receiver<Arc<Vec<Delta>>>,
    freshness: &mut worldsync_core::WorldStream<Freshness>,
    duration: Option<std::time::Duration>,
) -> Result<(), CliError> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                return Ok(());
            }
            () = &mut deadline => return Ok(()),
            changed = states.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = states.borrow_and_update().clone();
                printer.connection(&state)?;
            }
            fresh = freshness.changed() => {
                let Some(fresh) = fresh else {
                    return Ok(());
                };
                printer.emit(&WatchEvent::Freshness { freshness: &fresh })?;
            }
            batch = deltas.recv() => match batch {
                Ok(batch) => {
                    for delta in batch.iter() {
                        printer.emit(&WatchEvent::Delta { delta })?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "output fell behind, some delta batches were dropped");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

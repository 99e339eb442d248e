// ── Snapshot refresh ──
//
// One fetch path shared by every trigger (initial load, push notification,
// reconnect, polling, manual). A single-flight lock guarantees at most one
// fetch per source at a time: scheduled polls skip while one is running,
// everything else queues behind it.

use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use worldsync_api::WorldSnapshot;

use crate::demo::demo_snapshot;
use crate::error::CoreError;
use crate::model::Freshness;
use crate::source::SnapshotSource;
use crate::store::WorldStore;

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RefreshTrigger {
    Initial,
    Poll,
    Push,
    Reconnect,
    Lagged,
    Manual,
}

/// Result of a refresh that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A snapshot was fetched and applied, producing `deltas` changes.
    Applied { deltas: usize },
    /// A poll found another refresh in flight and did nothing.
    Skipped,
}

pub(crate) struct Refresher {
    source: Arc<dyn SnapshotSource>,
    store: Arc<WorldStore>,
    flight: Mutex<()>,
    demo_fallback: bool,
}

impl Refresher {
    pub(crate) fn new(
        source: Arc<dyn SnapshotSource>,
        store: Arc<WorldStore>,
        demo_fallback: bool,
    ) -> Self {
        Self {
            source,
            store,
            flight: Mutex::new(()),
            demo_fallback,
        }
    }

    /// Fetch and apply a snapshot.
    ///
    /// On failure the previous snapshot stays in place and is marked stale;
    /// if nothing was ever loaded and demo fallback is on, the demo world is
    /// applied as `synthetic`. The fetch error is returned either way.
    pub(crate) async fn refresh(&self, trigger: RefreshTrigger) -> Result<RefreshOutcome, CoreError> {
        let _guard = if trigger == RefreshTrigger::Poll {
            let Ok(guard) = self.flight.try_lock() else {
                debug!("poll skipped: refresh already in flight");
                return Ok(RefreshOutcome::Skipped);
            };
            guard
        } else {
            self.flight.lock().await
        };

        debug!(%trigger, source = %self.source.describe(), "refreshing snapshot");
        match self.source.fetch().await {
            Ok(snapshot) => {
                let deltas = self.store.apply_snapshot(snapshot, Freshness::Live);
                debug!(%trigger, deltas = deltas.len(), "snapshot applied");
                Ok(RefreshOutcome::Applied {
                    deltas: deltas.len(),
                })
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(%trigger, error = %e, "snapshot fetch failed, will retry");
                } else {
                    error!(%trigger, error = %e, "snapshot fetch failed");
                }
                self.fallback(&e);
                Err(e)
            }
        }
    }

    /// Apply a snapshot that arrived inline, serialized with fetches.
    pub(crate) async fn apply_inline(&self, snapshot: WorldSnapshot) -> usize {
        let _guard = self.flight.lock().await;
        let deltas = self.store.apply_snapshot(snapshot, Freshness::Live);
        debug!(deltas = deltas.len(), "inline snapshot applied");
        deltas.len()
    }

    fn fallback(&self, error: &CoreError) {
        if self.store.has_snapshot() || !self.demo_fallback {
            self.store.mark_stale(error.to_string());
            return;
        }
        info!("no snapshot loaded yet, falling back to demo data");
        self.store
            .apply_snapshot(demo_snapshot(), Freshness::Synthetic);
    }
}

/// Timer-driven polling. `interval` may be switched on, off, or to another
/// period at any time; a change restarts the schedule from now.
pub(crate) async fn poll_task(
    refresher: Arc<Refresher>,
    mut interval: watch::Receiver<Option<Duration>>,
    cancel: CancellationToken,
) {
    loop {
        let period = *interval.borrow_and_update();
        let Some(period) = period.filter(|p| !p.is_zero()) else {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                changed = interval.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
            continue;
        };

        debug!(period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "polling enabled");
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                changed = interval.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        _ = refresher.refresh(RefreshTrigger::Poll) => {}
                    }
                }
            }
        }
    }
}

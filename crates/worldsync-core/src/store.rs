// ── World store ──
//
// Holds the current snapshot and everything derived from it. Every value
// is published through a `watch` channel so readers never block writers;
// delta batches additionally go out on a broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use worldsync_api::WorldSnapshot;

use crate::delta::compute_world_deltas;
use crate::highlight::{HighlightMap, HighlightTracker};
use crate::model::{Delta, EntitySummary, Freshness, SummaryMap};
use crate::stream::WorldStream;
use crate::summarize::summarize_snapshot;

const DELTA_CHANNEL_SIZE: usize = 256;

/// Reactive store for the synchronized world view.
pub struct WorldStore {
    snapshot: watch::Sender<Arc<WorldSnapshot>>,
    summaries: watch::Sender<Arc<SummaryMap>>,
    freshness: watch::Sender<Freshness>,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
    last_deltas: watch::Sender<Arc<Vec<Delta>>>,
    delta_tx: broadcast::Sender<Arc<Vec<Delta>>>,
    highlights: Arc<HighlightTracker>,
}

impl WorldStore {
    pub fn new(highlight_ttl: Duration) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(WorldSnapshot::default()));
        let (summaries, _) = watch::channel(Arc::new(SummaryMap::new()));
        let (freshness, _) = watch::channel(Freshness::Empty);
        let (last_refresh, _) = watch::channel(None);
        let (last_deltas, _) = watch::channel(Arc::new(Vec::new()));
        let (delta_tx, _) = broadcast::channel(DELTA_CHANNEL_SIZE);

        Self {
            snapshot,
            summaries,
            freshness,
            last_refresh,
            last_deltas,
            delta_tx,
            highlights: Arc::new(HighlightTracker::new(highlight_ttl)),
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Replace the current snapshot, returning the changes it introduced.
    ///
    /// Summarizes `snapshot`, diffs it against the previous summaries,
    /// publishes everything and highlights the touched entities.
    pub fn apply_snapshot(&self, snapshot: WorldSnapshot, freshness: Freshness) -> Vec<Delta> {
        let next = summarize_snapshot(&snapshot);
        let mut deltas = Vec::new();

        // Diff and swap under the watch lock so concurrent applies
        // always compare against what they replace.
        self.summaries.send_modify(|current| {
            deltas = compute_world_deltas(current, &next);
            *current = Arc::new(next);
        });
        self.snapshot.send_replace(Arc::new(snapshot));
        self.set_freshness(freshness);
        self.last_refresh.send_replace(Some(Utc::now()));

        self.highlights.record(&deltas, Instant::now());
        let batch = Arc::new(deltas.clone());
        self.last_deltas.send_replace(Arc::clone(&batch));
        if !deltas.is_empty() {
            debug!(count = deltas.len(), "world deltas");
            // Ignore send errors -- just means no active subscribers right now
            let _ = self.delta_tx.send(batch);
        }

        deltas
    }

    /// Flag the current data as outdated without replacing it.
    pub fn mark_stale(&self, reason: impl Into<String>) {
        let reason = reason.into();
        info!(%reason, "world data marked stale");
        self.set_freshness(Freshness::Stale { reason });
    }

    fn set_freshness(&self, next: Freshness) {
        self.freshness.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn summaries(&self) -> Arc<SummaryMap> {
        self.summaries.borrow().clone()
    }

    pub fn entity(&self, id: &str) -> Option<Arc<EntitySummary>> {
        self.summaries.borrow().get(id).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.summaries.borrow().len()
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness.borrow().clone()
    }

    /// Whether any snapshot, live or synthetic, has been applied.
    pub fn has_snapshot(&self) -> bool {
        self.last_refresh.borrow().is_some()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }

    /// The batch produced by the most recent apply (possibly empty).
    pub fn last_deltas(&self) -> Arc<Vec<Delta>> {
        self.last_deltas.borrow().clone()
    }

    pub fn highlights(&self) -> &Arc<HighlightTracker> {
        &self.highlights
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_snapshot(&self) -> WorldStream<Arc<WorldSnapshot>> {
        WorldStream::new(self.snapshot.subscribe())
    }

    pub fn subscribe_summaries(&self) -> WorldStream<Arc<SummaryMap>> {
        WorldStream::new(self.summaries.subscribe())
    }

    pub fn subscribe_freshness(&self) -> WorldStream<Freshness> {
        WorldStream::new(self.freshness.subscribe())
    }

    pub fn subscribe_highlights(&self) -> WorldStream<Arc<HighlightMap>> {
        WorldStream::new(self.highlights.subscribe())
    }

    /// Every non-empty delta batch, in apply order.
    pub fn deltas(&self) -> broadcast::Receiver<Arc<Vec<Delta>>> {
        self.delta_tx.subscribe()
    }
}

impl std::fmt::Debug for WorldStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldStore")
            .field("entities", &self.entity_count())
            .field("freshness", &self.freshness())
            .field("highlights", &self.highlights.len())
            .finish_non_exhaustive()
    }
}

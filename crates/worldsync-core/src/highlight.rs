// ── Highlight tracker ──
//
// Time-bounded record of which entities changed recently. Writes come in
// delta batches; a separate sweep removes entries once they reach the TTL.
// All timestamps are tokio instants so a paused clock drives decay in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::model::{Delta, DeltaKind};

/// How long a change stays highlighted.
pub const DEFAULT_HIGHLIGHT_TTL: Duration = Duration::from_millis(8000);
/// How often expired highlights are swept.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(2000);

/// Snapshot of every highlight, keyed by entity id.
pub type HighlightMap = HashMap<String, HighlightEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightEntry {
    pub kind: DeltaKind,
    pub at: Instant,
}

impl HighlightEntry {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.at)
    }
}

/// Recently changed entities with TTL-based decay.
pub struct HighlightTracker {
    entries: DashMap<String, HighlightEntry>,
    snapshot: watch::Sender<Arc<HighlightMap>>,
    ttl: Duration,
}

impl HighlightTracker {
    pub fn new(ttl: Duration) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(HighlightMap::new()));
        Self {
            entries: DashMap::new(),
            snapshot,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mark every entity touched by `deltas`, all with the same timestamp.
    /// Later deltas for the same id overwrite earlier ones.
    pub fn record(&self, deltas: &[Delta], at: Instant) {
        if deltas.is_empty() {
            return;
        }
        for delta in deltas {
            self.entries.insert(
                delta.id.clone(),
                HighlightEntry {
                    kind: delta.kind,
                    at,
                },
            );
        }
        self.publish();
    }

    /// Drop entries whose age has reached the TTL. Publishes a new snapshot
    /// only when something was removed; returns how many were.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.age(now) < self.ttl);
        let pruned = before.saturating_sub(self.entries.len());
        if pruned > 0 {
            trace!(pruned, remaining = self.entries.len(), "highlights decayed");
            self.publish();
        }
        pruned
    }

    pub fn get(&self, id: &str) -> Option<HighlightEntry> {
        self.entries.get(id).map(|r| *r.value())
    }

    /// Whether `id` is highlighted and younger than the TTL at `now`,
    /// regardless of when the next sweep runs.
    pub fn is_active(&self, id: &str, now: Instant) -> bool {
        self.get(id).is_some_and(|e| e.age(now) < self.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.publish();
        }
    }

    pub fn snapshot(&self) -> Arc<HighlightMap> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<HighlightMap>> {
        self.snapshot.subscribe()
    }

    fn publish(&self) {
        let map: HighlightMap = self
            .entries
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect();
        self.snapshot.send_modify(|snap| *snap = Arc::new(map));
    }
}

impl std::fmt::Debug for HighlightTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighlightTracker")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Periodic decay sweep. Runs until `cancel` fires.
pub(crate) async fn sweep_task(
    tracker: Arc<HighlightTracker>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                tracker.sweep(Instant::now());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn delta(id: &str, kind: DeltaKind) -> Delta {
        Delta {
            id: id.into(),
            entity_type: "agent".into(),
            kind,
            label: format!("{id} {kind}"),
            previous: None,
            current: None,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn record_stamps_whole_batch_once() {
        let tracker = HighlightTracker::new(DEFAULT_HIGHLIGHT_TTL);
        let now = Instant::now();
        tracker.record(
            &[delta("a", DeltaKind::Added), delta("b", DeltaKind::Position)],
            now,
        );

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get("a").unwrap().at, now);
        assert_eq!(tracker.get("b").unwrap().at, now);
        assert_eq!(tracker.snapshot().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn last_write_wins() {
        let tracker = HighlightTracker::new(DEFAULT_HIGHLIGHT_TTL);
        let t0 = Instant::now();
        tracker.record(&[delta("a", DeltaKind::Added)], t0);
        tracker.record(
            &[delta("a", DeltaKind::Status), delta("a", DeltaKind::Position)],
            t0 + ms(500),
        );

        let entry = tracker.get("a").unwrap();
        assert_eq!(entry.kind, DeltaKind::Position);
        assert_eq!(entry.at, t0 + ms(500));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_at_ttl_boundary() {
        let tracker = HighlightTracker::new(DEFAULT_HIGHLIGHT_TTL);
        let t0 = Instant::now();
        tracker.record(&[delta("a", DeltaKind::Added)], t0);

        assert_eq!(tracker.sweep(t0 + ms(7999)), 0);
        assert!(tracker.get("a").is_some());
        assert_eq!(tracker.sweep(t0 + ms(8000)), 1);
        assert!(tracker.get("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_publishes_only_when_something_pruned() {
        let tracker = HighlightTracker::new(DEFAULT_HIGHLIGHT_TTL);
        let mut rx = tracker.subscribe();
        let t0 = Instant::now();

        tracker.record(&[delta("a", DeltaKind::Added)], t0);
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        tracker.sweep(t0 + ms(1000));
        assert!(!rx.has_changed().unwrap());

        tracker.sweep(t0 + ms(9000));
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_is_ignored() {
        let tracker = HighlightTracker::new(DEFAULT_HIGHLIGHT_TTL);
        let rx = tracker.subscribe();
        tracker.record(&[], Instant::now());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn is_active_ignores_sweep_lag() {
        let tracker = HighlightTracker::new(DEFAULT_HIGHLIGHT_TTL);
        let t0 = Instant::now();
        tracker.record(&[delta("a", DeltaKind::Status)], t0);

        assert!(tracker.is_active("a", t0 + ms(7999)));
        assert!(!tracker.is_active("a", t0 + ms(8001)));
        assert!(!tracker.is_active("missing", t0));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_task_decays_on_schedule() {
        let tracker = Arc::new(HighlightTracker::new(DEFAULT_HIGHLIGHT_TTL));
        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        let task = tokio::spawn(sweep_task(
            Arc::clone(&tracker),
            DEFAULT_SWEEP_INTERVAL,
            cancel.clone(),
        ));

        tracker.record(&[delta("a", DeltaKind::Added)], t0);

        tokio::time::sleep_until(t0 + ms(7999)).await;
        assert!(tracker.get("a").is_some(), "still highlighted at T+7999");

        tokio::time::sleep_until(t0 + ms(8001)).await;
        assert!(tracker.get("a").is_none(), "swept by T+8001");

        cancel.cancel();
        task.await.unwrap();
    }
}

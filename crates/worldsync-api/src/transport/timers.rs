// ── Purpose-keyed timer table ──
//
// The transport driver owns every deadline it waits on through this table.
// One slot per purpose: scheduling a purpose that is already pending
// replaces its deadline, and `clear()` drops everything at teardown.

use std::collections::BTreeMap;

use strum::{Display, IntoStaticStr};
use tokio::time::Instant;

/// What a pending transport timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TimerPurpose {
    /// Next heartbeat ping while connected.
    Ping,
    /// Next reconnect attempt after a close.
    Reconnect,
}

#[derive(Debug, Default)]
pub(crate) struct TimerTable {
    slots: BTreeMap<TimerPurpose, Instant>,
}

impl TimerTable {
    pub(crate) fn schedule(&mut self, purpose: TimerPurpose, at: Instant) {
        self.slots.insert(purpose, at);
    }

    pub(crate) fn cancel(&mut self, purpose: TimerPurpose) -> bool {
        self.slots.remove(&purpose).is_some()
    }

    pub(crate) fn is_pending(&self, purpose: TimerPurpose) -> bool {
        self.slots.contains_key(&purpose)
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    /// Earliest deadline across all purposes.
    pub(crate) fn next_due(&self) -> Option<(TimerPurpose, Instant)> {
        self.slots
            .iter()
            .min_by_key(|(_, at)| **at)
            .map(|(purpose, at)| (*purpose, *at))
    }

    pub(crate) fn pending(&self) -> Vec<TimerPurpose> {
        self.slots.keys().copied().collect()
    }
}

/// Resolve when the earliest timer is due, or never if the table is empty.
pub(crate) async fn wait_due(next: Option<(TimerPurpose, Instant)>) -> TimerPurpose {
    match next {
        Some((purpose, at)) => {
            tokio::time::sleep_until(at).await;
            purpose
        }
        None => std::future::pending().await,
    }
}

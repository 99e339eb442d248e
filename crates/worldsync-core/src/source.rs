// ── Snapshot sources ──
//
// Where full snapshots come from. The sync loop only sees the trait, so the
// REST endpoint can be swapped for fixed data in tests or offline use.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use url::Url;

use worldsync_api::{SnapshotClient, WorldSnapshot};

use crate::error::CoreError;

/// Something that can produce the current world snapshot on demand.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'_, Result<WorldSnapshot, CoreError>>;

    /// Short human-readable origin, used in logs.
    fn describe(&self) -> String;
}

// ── HTTP ─────────────────────────────────────────────────────────────

/// Fetches snapshots from the REST endpoint.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: SnapshotClient,
}

impl HttpSnapshotSource {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, CoreError> {
        Ok(Self {
            client: SnapshotClient::new(url, timeout)?,
        })
    }

    pub fn from_client(client: SnapshotClient) -> Self {
        Self { client }
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch(&self) -> BoxFuture<'_, Result<WorldSnapshot, CoreError>> {
        Box::pin(async move { Ok(self.client.fetch().await?) })
    }

    fn describe(&self) -> String {
        self.client.url().to_string()
    }
}

// ── Static ───────────────────────────────────────────────────────────

/// Serves whatever snapshot it currently holds.
///
/// The held snapshot can be replaced at any time, fetches can be made to
/// fail, and an artificial latency can be added to every fetch.
pub struct StaticSnapshotSource {
    snapshot: ArcSwap<WorldSnapshot>,
    failing: AtomicBool,
    fetches: AtomicUsize,
    latency: Duration,
}

impl StaticSnapshotSource {
    pub fn new(snapshot: WorldSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            failing: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Every fetch sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set(&self, snapshot: WorldSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fetches started so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for StaticSnapshotSource {
    fn fetch(&self) -> BoxFuture<'_, Result<WorldSnapshot, CoreError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(CoreError::SourceUnavailable {
                    reason: "static source is failing".into(),
                });
            }
            Ok(self.snapshot.load().as_ref().clone())
        })
    }

    fn describe(&self) -> String {
        "static".into()
    }
}

impl std::fmt::Debug for StaticSnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSnapshotSource")
            .field("entities", &self.snapshot.load().entities.len())
            .field("failing", &self.failing.load(Ordering::SeqCst))
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

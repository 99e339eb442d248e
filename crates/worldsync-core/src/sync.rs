// ── World sync ──
//
// Full lifecycle for one synchronized world view. Wires the transport's
// message stream into snapshot refetches or inline applies, keeps the
// highlight decay sweep and the poller running, and tears all of it down
// on `stop()`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use strum::{Display, IntoStaticStr};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use worldsync_api::transport::{ConnectionState, Connector, Subscription, Transport};
use worldsync_api::{Envelope, MessageKind, WorldSnapshot};

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::highlight::sweep_task;
use crate::refresh::{RefreshOutcome, RefreshTrigger, Refresher, poll_task};
use crate::source::SnapshotSource;
use crate::store::WorldStore;

/// Background tasks owned by a running [`WorldSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TaskPurpose {
    /// Transport messages and connection changes → store.
    Bridge,
    /// Highlight decay.
    Sweep,
    /// Scheduled refetch.
    Poll,
}

// ── WorldSync ────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SyncInner>`. Construct, [`start()`](Self::start),
/// read the [`store()`](Self::store), and [`stop()`](Self::stop) when done.
#[derive(Clone)]
pub struct WorldSync {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    config: SyncConfig,
    store: Arc<WorldStore>,
    transport: Transport,
    refresher: Arc<Refresher>,
    refresh_interval: watch::Sender<Option<Duration>>,
    cancel: CancellationToken,
    /// Child token for the current run, replaced on every start.
    cancel_child: Mutex<CancellationToken>,
    tasks: Mutex<BTreeMap<TaskPurpose, JoinHandle<()>>>,
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl WorldSync {
    /// Build the store and transport. Does NOT connect -- call
    /// [`start()`](Self::start).
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn SnapshotSource>,
        connector: impl Connector,
    ) -> Self {
        let store = Arc::new(WorldStore::new(config.highlight_ttl));
        let transport = Transport::new(config.transport_config(), connector);
        let refresher = Arc::new(Refresher::new(
            source,
            Arc::clone(&store),
            config.demo_fallback,
        ));
        let (refresh_interval, _) = watch::channel(config.refresh_interval);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(SyncInner {
                config,
                store,
                transport,
                refresher,
                refresh_interval,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                tasks: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<WorldStore> {
        &self.inner.store
    }

    /// The underlying transport, for subscribing to message types the sync
    /// loop does not consume (`log`, `telemetry`, ...).
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.transport.connection_state()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Load the initial snapshot, spawn background tasks and connect.
    ///
    /// A failed initial fetch is not fatal: the store falls back as
    /// configured and the sync keeps trying. Calling `start()` on a running
    /// sync does nothing.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut tasks = self.inner.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("start ignored: already running");
            return Ok(());
        }

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        if let Err(e) = self.inner.refresher.refresh(RefreshTrigger::Initial).await {
            warn!(error = %e, "initial snapshot unavailable");
        }

        // Subscribe before connecting so nothing is missed.
        let messages = self.inner.transport.subscribe();
        let (reconnected_tx, reconnected) = mpsc::unbounded_channel();
        let tracker = DropTracker::new(Arc::clone(&self.inner.store), reconnected_tx);
        let connection = self
            .inner
            .transport
            .on_connection_change(move |state| tracker.observe(state));

        tasks.insert(
            TaskPurpose::Bridge,
            tokio::spawn(bridge_task(
                Arc::clone(&self.inner.refresher),
                messages,
                reconnected,
                connection,
                child.clone(),
            )),
        );
        tasks.insert(
            TaskPurpose::Sweep,
            tokio::spawn(sweep_task(
                Arc::clone(self.inner.store.highlights()),
                self.inner.config.sweep_interval,
                child.clone(),
            )),
        );
        tasks.insert(
            TaskPurpose::Poll,
            tokio::spawn(poll_task(
                Arc::clone(&self.inner.refresher),
                self.inner.refresh_interval.subscribe(),
                child,
            )),
        );

        self.inner.transport.connect();
        info!(
            socket = %self.inner.config.socket_url,
            snapshot = %self.inner.config.snapshot_url,
            "world sync started"
        );
        Ok(())
    }

    /// Cancel every background task and disconnect the transport.
    ///
    /// When this returns no sync task is running and the transport has no
    /// pending timers.
    pub async fn stop(&self) {
        self.inner.cancel_child.lock().await.cancel();

        let mut tasks = self.inner.tasks.lock().await;
        for (purpose, handle) in std::mem::take(&mut *tasks) {
            if let Err(e) = handle.await {
                warn!(task = %purpose, error = %e, "sync task ended abnormally");
            }
        }
        drop(tasks);

        let mut state = self.inner.transport.connection_state();
        self.inner.transport.disconnect();
        if state.borrow().clone() != ConnectionState::Disconnected {
            let _ = state
                .wait_for(|s| *s == ConnectionState::Disconnected)
                .await;
        }
        debug!("world sync stopped");
    }

    pub async fn is_running(&self) -> bool {
        !self.inner.tasks.lock().await.is_empty()
    }

    /// Background tasks currently alive.
    pub async fn pending_tasks(&self) -> Vec<TaskPurpose> {
        self.inner
            .tasks
            .lock()
            .await
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(purpose, _)| *purpose)
            .collect()
    }

    // ── Refresh control ──────────────────────────────────────────

    /// Refetch now, through the same path as every other trigger.
    ///
    /// Fails with [`CoreError::NotRunning`] before `start()` or after
    /// `stop()`.
    pub async fn refresh(&self) -> Result<RefreshOutcome, CoreError> {
        if !self.is_running().await {
            return Err(CoreError::NotRunning);
        }
        self.inner.refresher.refresh(RefreshTrigger::Manual).await
    }

    /// Turn polling on (`Some`) or off (`None`), effective immediately.
    pub fn set_refresh_interval(&self, interval: Option<Duration>) {
        info!(?interval, "refresh interval changed");
        self.inner.refresh_interval.send_replace(interval);
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        *self.inner.refresh_interval.borrow()
    }
}

impl std::fmt::Debug for WorldSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldSync")
            .field("transport", &self.inner.transport)
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

// ── Bridge ───────────────────────────────────────────────────────────

/// What the bridge does in response to one transport event.
enum BridgeAction {
    Refetch(RefreshTrigger),
    Apply(WorldSnapshot),
    Nothing,
}

/// Feeds socket traffic into the store.
///
/// `snapshot` with inline data is applied directly; `snapshot` without
/// usable data, `update` and `graph_update` trigger a refetch. A lagged
/// receiver refetches because messages were lost. Reconnects reported by
/// the [`DropTracker`] refetch as well. The task owns the tracker's
/// `connection` subscription, so the tracker stops with it.
async fn bridge_task(
    refresher: Arc<Refresher>,
    mut messages: broadcast::Receiver<Arc<Envelope>>,
    mut reconnected: mpsc::UnboundedReceiver<()>,
    connection: Subscription,
    cancel: CancellationToken,
) {
    loop {
        let action = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            restored = reconnected.recv() => match restored {
                Some(()) => BridgeAction::Refetch(RefreshTrigger::Reconnect),
                None => break,
            },
            result = messages.recv() => match result {
                Ok(message) => on_message(&message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "bridge lagged behind transport, refetching");
                    BridgeAction::Refetch(RefreshTrigger::Lagged)
                }
                Err(RecvError::Closed) => break,
            },
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = run(&refresher, action) => {}
        }
    }
    connection.unsubscribe();
}

// ── Drop tracking ────────────────────────────────────────────────────

/// Watches connection transitions from the transport's synchronous state
/// callback, which sees every transition even while the bridge is busy
/// with a refetch.
///
/// The first drop marks the store stale right away. The next `Connected`
/// queues one reconnect refetch for the bridge.
struct DropTracker {
    store: Arc<WorldStore>,
    reconnected: mpsc::UnboundedSender<()>,
    primed: AtomicBool,
    dropped: AtomicBool,
}

impl DropTracker {
    fn new(store: Arc<WorldStore>, reconnected: mpsc::UnboundedSender<()>) -> Self {
        Self {
            store,
            reconnected,
            primed: AtomicBool::new(false),
            dropped: AtomicBool::new(false),
        }
    }

    fn observe(&self, state: &ConnectionState) {
        // Registration replays the state we start from; that is not a drop.
        if !self.primed.swap(true, Ordering::AcqRel) {
            return;
        }

        match state {
            ConnectionState::Connected => {
                if self.dropped.swap(false, Ordering::AcqRel) {
                    info!("connection restored, refetching snapshot");
                    if self.reconnected.send(()).is_err() {
                        debug!("bridge gone, reconnect refetch skipped");
                    }
                }
            }
            ConnectionState::Disconnected
            | ConnectionState::Error
            | ConnectionState::Reconnecting { .. } => {
                if !self.dropped.swap(true, Ordering::AcqRel) {
                    self.store.mark_stale(format!("connection {state}"));
                }
            }
            ConnectionState::Connecting => {}
        }
    }
}

fn on_message(message: &Envelope) -> BridgeAction {
    match message.kind() {
        MessageKind::Snapshot => message
            .data
            .as_ref()
            .and_then(WorldSnapshot::from_payload)
            .map_or(BridgeAction::Refetch(RefreshTrigger::Push), BridgeAction::Apply),
        MessageKind::Update | MessageKind::GraphUpdate => {
            BridgeAction::Refetch(RefreshTrigger::Push)
        }
        kind => {
            trace!(%kind, "message left to transport subscribers");
            BridgeAction::Nothing
        }
    }
}

async fn run(refresher: &Refresher, action: BridgeAction) {
    match action {
        BridgeAction::Refetch(trigger) => {
            // Failures are already logged and reflected in freshness.
            let _ = refresher.refresh(trigger).await;
        }
        BridgeAction::Apply(snapshot) => {
            refresher.apply_inline(snapshot).await;
        }
        BridgeAction::Nothing => {}
    }
}

//! Reconnecting socket transport with heartbeat and fan-out.
//!
//! A single driver task owns the socket and every timer the connection
//! needs. The cloneable [`Transport`] handle talks to it over a command
//! channel and observes it through `watch` channels, so the socket is never
//! shared and consumers can only observe the [`ConnectionState`].
//!
//! Lifecycle:
//!
//! ```text
//! disconnected → connecting → connected → (error) → disconnected
//!                    ↑                                   │
//!                    └──── reconnecting{attempt} ←───────┘
//! ```
//!
//! After `max_attempts` scheduled reconnects without a successful open the
//! transport parks in [`ConnectionState::Error`] until the caller invokes
//! [`Transport::connect`] again. [`Transport::disconnect`] is the only way
//! to stop reconnecting on purpose.
//!
//! # Example
//!
//! ```rust,ignore
//! use worldsync_api::transport::{Transport, TransportConfig, TungsteniteConnector};
//!
//! let config = TransportConfig::new("ws://localhost:8000/ws".parse()?);
//! let transport = Transport::new(config, TungsteniteConnector);
//!
//! let _sub = transport.on_message(|msg| println!("{}", msg.message_type));
//! transport.connect();
//! ```

pub mod backoff;
mod handlers;
pub mod memory;
pub mod socket;
mod timers;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use strum::Display;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::envelope::{Envelope, MessageKind};
use crate::error::Error;

pub use backoff::{Backoff, ReconnectConfig};
pub use handlers::Subscription;
use handlers::{HandlerRegistry, Sequenced};
pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use socket::{Connector, Socket, SocketEvent, TungsteniteConnector};
pub use timers::TimerPurpose;
use timers::TimerTable;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Heartbeat ping period while connected.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers. Only the transport sets it.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A reconnect is scheduled; `attempt` counts reconnects since the last
    /// successful open.
    Reconnecting { attempt: u32 },
    Error,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ── TransportConfig ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Socket URL (`ws://` or `wss://`).
    pub url: Url,
    pub reconnect: ReconnectConfig,
    /// Heartbeat ping period. Default: 10s.
    pub ping_interval: Duration,
}

impl TransportConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: ReconnectConfig::default(),
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}

// ── Transport handle ─────────────────────────────────────────────────

/// Handle to a running transport driver.
///
/// Cheaply cloneable. The driver stops when [`shutdown`](Self::shutdown) is
/// called or the last handle is dropped.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    config: TransportConfig,
    shared: Arc<Shared>,
    command_tx: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State the driver publishes and the handle reads.
struct Shared {
    state: watch::Sender<ConnectionState>,
    /// Latest state with its transition number, for ordered replay.
    latest: Mutex<Sequenced<ConnectionState>>,
    heartbeat: watch::Sender<Option<Instant>>,
    timers: watch::Sender<Vec<TimerPurpose>>,
    message_handlers: Arc<HandlerRegistry<Envelope>>,
    state_handlers: Arc<HandlerRegistry<Sequenced<ConnectionState>>>,
    event_tx: broadcast::Sender<Arc<Envelope>>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        debug!(state = %next, "connection state");
        let transition = {
            let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
            latest.seq += 1;
            latest.value = next.clone();
            self.state.send_replace(next);
            latest.clone()
        };
        self.state_handlers.dispatch(&transition);
    }

    fn latest_state(&self) -> Sequenced<ConnectionState> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Send(String),
}

impl Transport {
    /// Spawn the driver task. Does NOT connect -- call
    /// [`connect()`](Self::connect).
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: TransportConfig, connector: impl Connector) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (heartbeat, _) = watch::channel(None);
        let (timers, _) = watch::channel(Vec::new());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let shared = Arc::new(Shared {
            state,
            latest: Mutex::new(Sequenced {
                seq: 0,
                value: ConnectionState::Disconnected,
            }),
            heartbeat,
            timers,
            message_handlers: Arc::new(HandlerRegistry::new()),
            state_handlers: Arc::new(HandlerRegistry::new()),
            event_tx,
        });

        let driver = Driver {
            backoff: Backoff::new(config.reconnect.clone()),
            config: config.clone(),
            connector: Arc::new(connector),
            shared: Arc::clone(&shared),
            commands: command_rx,
            cancel: cancel.clone(),
            link: Link::Idle,
            timers: TimerTable::default(),
        };
        tokio::spawn(driver.run());

        Self {
            inner: Arc::new(TransportInner {
                config,
                shared,
                command_tx,
                cancel,
            }),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Open the socket. A no-op while a socket is opening or open.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the socket, cancel every timer and stop reconnecting.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Send a message. Dropped silently when the socket is not open.
    pub fn send(&self, message: &Envelope) {
        match serde_json::to_string(message) {
            Ok(text) => self.command(Command::Send(text)),
            Err(e) => warn!(error = %e, "could not encode outbound message"),
        }
    }

    /// Stop the driver task. The socket is closed and all timers dropped.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    fn command(&self, command: Command) {
        if let Err(e) = self.inner.command_tx.send(command) {
            debug!(command = ?e.0, "transport driver gone, command dropped");
        }
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Register a message handler. Handlers run on the driver task, in
    /// registration order, for every message except `pong`.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.shared.message_handlers.register(Arc::new(handler))
    }

    /// Register a connection-state handler. It is called immediately with
    /// the current state, then on every transition. A handler never sees
    /// an older state after a newer one.
    pub fn on_connection_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        let handler = handlers::in_order::<ConnectionState, _>(handler);
        let subscription = self
            .inner
            .shared
            .state_handlers
            .register(Arc::clone(&handler));
        handler(&self.inner.shared.latest_state());
        subscription
    }

    /// Broadcast receiver for the message stream.
    ///
    /// If a consumer falls behind, it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.inner.shared.event_tx.subscribe()
    }

    /// Watch receiver for connection state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state.borrow().clone()
    }

    // ── Liveness ─────────────────────────────────────────────────

    /// When the last open or `pong` was seen. The transport never kills a
    /// quiet connection itself; callers apply their own staleness policy.
    pub fn last_heartbeat(&self) -> Option<Instant> {
        *self.inner.shared.heartbeat.borrow()
    }

    pub fn heartbeat_age(&self) -> Option<Duration> {
        self.last_heartbeat().map(|at| at.elapsed())
    }

    /// Timers the driver is currently waiting on.
    pub fn pending_timers(&self) -> Vec<TimerPurpose> {
        self.inner.shared.timers.borrow().clone()
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("url", &self.inner.config.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Driver ───────────────────────────────────────────────────────────

enum Link {
    Idle,
    Opening(BoxFuture<'static, Result<Socket, Error>>),
    Open(Socket),
}

enum Wake {
    Command(Command),
    Opened(Result<Socket, Error>),
    Socket(SocketEvent),
    Timer(TimerPurpose),
}

struct Driver<C> {
    config: TransportConfig,
    connector: Arc<C>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    link: Link,
    timers: TimerTable,
    backoff: Backoff,
}

/// Resolve with the next thing that happens on the link.
async fn link_event(link: &mut Link) -> Wake {
    match link {
        Link::Idle => std::future::pending().await,
        Link::Opening(open) => Wake::Opened(open.await),
        Link::Open(socket) => Wake::Socket(socket.recv().await),
    }
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        loop {
            let next_timer = self.timers.next_due();
            let wake = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => Wake::Command(command),
                    None => break,
                },
                purpose = timers::wait_due(next_timer) => Wake::Timer(purpose),
                wake = link_event(&mut self.link) => wake,
            };

            self.handle(wake);
            self.publish_timers();
        }

        self.teardown();
        debug!("transport driver exiting");
    }

    fn handle(&mut self, wake: Wake) {
        match wake {
            Wake::Command(Command::Connect) => {
                self.timers.cancel(TimerPurpose::Reconnect);
                self.connect();
            }
            Wake::Command(Command::Disconnect) => self.disconnect(),
            Wake::Command(Command::Send(text)) => self.send(text),
            Wake::Opened(Ok(socket)) => self.on_open(socket),
            Wake::Opened(Err(e)) => {
                warn!(error = %e, attempt = self.backoff.attempt(), "socket open failed");
                self.link = Link::Idle;
                self.shared.set_state(ConnectionState::Error);
                self.on_close(None, &e.to_string());
            }
            Wake::Socket(SocketEvent::Text(text)) => self.on_text(&text),
            Wake::Socket(SocketEvent::Error(message)) => {
                // The close that follows drives reconnection.
                warn!(error = %message, "socket error");
                self.shared.set_state(ConnectionState::Error);
            }
            Wake::Socket(SocketEvent::Closed { code, reason }) => {
                self.link = Link::Idle;
                self.on_close(code, &reason);
            }
            Wake::Timer(TimerPurpose::Ping) => self.on_ping_due(),
            Wake::Timer(TimerPurpose::Reconnect) => {
                self.timers.cancel(TimerPurpose::Reconnect);
                self.connect();
            }
        }
    }

    fn connect(&mut self) {
        if !matches!(self.link, Link::Idle) {
            debug!("connect ignored: socket already active");
            return;
        }
        self.shared.set_state(ConnectionState::Connecting);
        self.link = Link::Opening(self.connector.open(&self.config.url));
    }

    fn disconnect(&mut self) {
        info!("disconnecting");
        self.timers.clear();
        self.publish_timers();
        self.link = Link::Idle;
        self.backoff.reset();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    fn on_open(&mut self, socket: Socket) {
        info!(url = %self.config.url, "socket open");
        self.link = Link::Open(socket);
        self.shared.set_state(ConnectionState::Connected);
        self.backoff.reset();

        let now = Instant::now();
        self.shared.heartbeat.send_replace(Some(now));
        self.timers
            .schedule(TimerPurpose::Ping, now + self.config.ping_interval);

        self.send_envelope(&Envelope::subscribe());
    }

    fn on_text(&self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "discarding unparseable message");
                return;
            }
        };

        if envelope.kind() == MessageKind::Pong {
            trace!(connection_id = ?envelope.connection_id(), "pong");
            self.shared.heartbeat.send_replace(Some(Instant::now()));
            return;
        }

        let envelope = Arc::new(envelope);
        self.shared.message_handlers.dispatch(&envelope);
        // Ignore send errors -- just means no active subscribers right now
        let _ = self.shared.event_tx.send(envelope);
    }

    fn on_close(&mut self, code: Option<u16>, reason: &str) {
        info!(?code, reason, "socket closed");
        self.timers.cancel(TimerPurpose::Ping);
        self.shared.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.backoff.is_exhausted() {
            error!(
                max_attempts = self.config.reconnect.max_attempts,
                "reconnection limit reached, giving up"
            );
            self.shared.set_state(ConnectionState::Error);
            return;
        }
        if self.timers.is_pending(TimerPurpose::Reconnect) {
            return;
        }

        let delay = self.backoff.next_delay();
        let attempt = self.backoff.attempt();
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );
        self.timers
            .schedule(TimerPurpose::Reconnect, Instant::now() + delay);
        self.shared
            .set_state(ConnectionState::Reconnecting { attempt });
    }

    fn on_ping_due(&mut self) {
        if !matches!(self.link, Link::Open(_)) {
            self.timers.cancel(TimerPurpose::Ping);
            return;
        }
        self.send_envelope(&Envelope::ping());
        self.timers.schedule(
            TimerPurpose::Ping,
            Instant::now() + self.config.ping_interval,
        );
    }

    fn send_envelope(&self, envelope: &Envelope) {
        match serde_json::to_string(envelope) {
            Ok(text) => self.send(text),
            Err(e) => warn!(error = %e, "could not encode outbound message"),
        }
    }

    fn send(&self, text: String) {
        match &self.link {
            Link::Open(socket) => {
                if !socket.send(text) {
                    debug!("socket gone, outbound frame dropped");
                }
            }
            _ => trace!("not connected, outbound frame dropped"),
        }
    }

    fn publish_timers(&self) {
        let pending = self.timers.pending();
        self.shared.timers.send_if_modified(|current| {
            if *current == pending {
                false
            } else {
                *current = pending;
                true
            }
        });
    }

    fn teardown(&mut self) {
        self.timers.clear();
        self.link = Link::Idle;
        self.publish_timers();
        let current = self.shared.state.borrow().clone();
        if current != ConnectionState::Disconnected {
            self.shared.set_state(ConnectionState::Disconnected);
        }
    }
}

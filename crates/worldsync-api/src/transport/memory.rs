// ── In-process connector ──
//
// A `Connector` whose "server" is a `MemoryListener` in the same process.
// Each successful open hands the listener a `MemoryPeer` that can push
// frames, errors and closes at the client and read what the client sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use url::Url;

use super::socket::{Connector, Socket, SocketEvent};
use crate::envelope::Envelope;
use crate::error::Error;

/// Connector that pairs each open with a [`MemoryPeer`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusing: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

/// Server side of a [`MemoryConnector`]: yields one peer per accepted open.
#[derive(Debug)]
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers: tx,
            refusing: Arc::new(AtomicBool::new(false)),
            opens: Arc::new(AtomicUsize::new(0)),
        };
        (connector, MemoryListener { peers: rx })
    }

    /// While set, every open fails as if the server refused the handshake.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Opens attempted so far, refused ones included.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn open(&self, url: &Url) -> BoxFuture<'static, Result<Socket, Error>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let result = if self.refusing.load(Ordering::SeqCst) {
            Err(Error::WebSocketConnect("connection refused".into()))
        } else {
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let peer = MemoryPeer {
                url: url.clone(),
                to_client: in_tx,
                from_client: out_rx,
            };
            self.peers
                .send(peer)
                .map(|()| Socket::new(out_tx, in_rx))
                .map_err(|_| Error::WebSocketConnect("listener dropped".into()))
        };

        Box::pin(async move { result })
    }
}

impl MemoryListener {
    /// Wait for the next accepted open.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// The next accepted open, if one is already queued.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

// ── MemoryPeer ───────────────────────────────────────────────────────

/// The server end of one in-memory socket.
///
/// Dropping the peer without calling [`close`](Self::close) reads on the
/// client side as the stream ending.
#[derive(Debug)]
pub struct MemoryPeer {
    url: Url,
    to_client: mpsc::UnboundedSender<SocketEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// URL the client opened.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(SocketEvent::Text(text.into()));
    }

    pub fn send_envelope(&self, envelope: &Envelope) {
        if let Ok(text) = serde_json::to_string(envelope) {
            self.send_text(text);
        }
    }

    /// Report a stream error without closing.
    pub fn send_error(&self, message: impl Into<String>) {
        let _ = self.to_client.send(SocketEvent::Error(message.into()));
    }

    /// Close the socket with a close frame.
    pub fn close(self, code: u16, reason: impl Into<String>) {
        let _ = self.to_client.send(SocketEvent::Closed {
            code: Some(code),
            reason: reason.into(),
        });
    }

    /// Next text frame from the client, or `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame from the client, decoded as an [`Envelope`].
    pub async fn recv_envelope(&mut self) -> Option<Envelope> {
        let text = self.recv().await?;
        Envelope::parse(&text).ok()
    }

    /// A frame the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// `true` once the client dropped its end.
    pub fn is_client_gone(&self) -> bool {
        self.to_client.is_closed()
    }
}

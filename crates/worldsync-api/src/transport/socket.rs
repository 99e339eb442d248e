// ── Socket capability seam ──
//
// The transport driver never touches a concrete WebSocket. It asks a
// `Connector` for a `Socket`: an outbound text sender plus an inbound event
// receiver. Dropping the socket closes it.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use url::Url;

use crate::error::Error;

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame.
    Text(String),
    /// A stream-level error. A `Closed` event is expected to follow.
    Error(String),
    /// The socket is gone. No further events follow.
    Closed { code: Option<u16>, reason: String },
}

/// An open socket, as handed to the transport by a [`Connector`].
#[derive(Debug)]
pub struct Socket {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

impl Socket {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<SocketEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a text frame. Returns `false` if the peer side is gone.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }

    /// Next inbound event. An exhausted channel reads as a close.
    pub async fn recv(&mut self) -> SocketEvent {
        self.inbound.recv().await.unwrap_or_else(|| SocketEvent::Closed {
            code: None,
            reason: "stream ended".into(),
        })
    }
}

/// Opens sockets for the transport.
///
/// Implementations must be cheap to call repeatedly: the transport calls
/// [`open`](Self::open) once per connection attempt.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &Url) -> BoxFuture<'static, Result<Socket, Error>>;
}

// ── tokio-tungstenite implementation ─────────────────────────────────

/// Production connector backed by `tokio-tungstenite`.
///
/// Each open spawns a pump task that shuttles frames between the
/// WebSocket stream and the [`Socket`] channels.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(&self, url: &Url) -> BoxFuture<'static, Result<Socket, Error>> {
        let url = url.clone();
        Box::pin(async move {
            tracing::info!(url = %url, "connecting to WebSocket");

            let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

            tracing::info!("WebSocket connected");

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            tokio::spawn(pump(ws_stream, out_rx, in_tx));

            Ok(Socket::new(out_tx, in_rx))
        })
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Move frames until either side goes away.
async fn pump(
    ws_stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<SocketEvent>,
) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            text = outbound.recv() => {
                let Some(text) = text else {
                    // Socket handle dropped: close politely.
                    let _ = write.close().await;
                    tracing::debug!("WebSocket closed by client");
                    break;
                };
                if let Err(e) = write.send(tungstenite::Message::text(text)).await {
                    let _ = inbound.send(SocketEvent::Error(e.to_string()));
                    let _ = inbound.send(SocketEvent::Closed { code: None, reason: e.to_string() });
                    break;
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        let _ = inbound.send(SocketEvent::Text(text.to_string()));
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let (code, reason) = frame.map_or((None, String::new()), |cf| {
                            (Some(u16::from(cf.code)), cf.reason.to_string())
                        });
                        tracing::info!(?code, reason = %reason, "WebSocket close frame received");
                        let _ = inbound.send(SocketEvent::Closed { code, reason });
                        break;
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers protocol pings itself
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                    Some(Err(e)) => {
                        let _ = inbound.send(SocketEvent::Error(e.to_string()));
                        let _ = inbound.send(SocketEvent::Closed { code: None, reason: e.to_string() });
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        let _ = inbound.send(SocketEvent::Closed {
                            code: None,
                            reason: "stream ended".into(),
                        });
                        break;
                    }
                }
            }
        }
    }
}

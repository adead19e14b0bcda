//! Connection manager: owns the WebSocket's lifecycle and supplies the
//! send/receive primitives the layers above use.
//!
//! Exactly one live transport exists per session attempt. A spawned reader
//! task turns the socket's stream into [`ConnectionEvent`]s on an mpsc
//! channel and routes correlated responses through the pending-request map;
//! after the open, exactly one `Error` or `Closed` event eventually fires.
//! Dropping the connection aborts the reader and fails all outstanding
//! requests, so release is guaranteed on every exit path.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::{ProtocolError, SessionError};
use crate::protocol::{self, InboundFrame, PushMessage, RequestFrame, ResponseFrame};
use crate::session::pending::PendingRequests;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bounded buffer for push/lifecycle events. Pushes beyond capacity are
/// dropped with a warning rather than blocking the reader; terminal events
/// are always delivered.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle and message events surfaced by the reader task, in delivery
/// order.
#[derive(Debug)]
pub(crate) enum ConnectionEvent {
    Push(PushMessage),
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

/// Why a correlated request did not produce a response.
#[derive(Debug)]
pub(crate) enum RequestError {
    Timeout,
    ConnectionLost(String),
    Transport(String),
}

/// The live transport handle.
pub(crate) struct Connection {
    sink: SplitSink<WsStream, Message>,
    events: mpsc::Receiver<ConnectionEvent>,
    pending: Arc<PendingRequests>,
    reader: JoinHandle<()>,
    closed: bool,
}

impl Connection {
    /// Open a connection to the coordinator endpoint.
    pub async fn open(endpoint: &str) -> Result<Self, SessionError> {
        validate_ws_endpoint(endpoint)?;

        let (stream, _response) =
            connect_async(endpoint)
                .await
                .map_err(|e| SessionError::Transport {
                    reason: format!("failed to open connection: {e}"),
                })?;
        tracing::debug!(endpoint, "coordinator connection open");

        let (sink, read_half) = stream.split();
        let pending = Arc::new(PendingRequests::new());
        let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&pending), event_tx));

        Ok(Self {
            sink,
            events,
            pending,
            reader,
            closed: false,
        })
    }

    /// Transmit a serialized frame. Calling this without an open connection
    /// is a caller error.
    pub async fn send(&mut self, frame: &RequestFrame) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::NotConnected);
        }
        self.sink
            .send(Message::Text(frame.encode().into()))
            .await
            .map_err(|e| SessionError::Transport {
                reason: format!("send failed: {e}"),
            })
    }

    /// Send a correlated request and wait for its response until `deadline`.
    ///
    /// The request id is assigned by the pending map and handed to `build`;
    /// the entry is destroyed on every settlement path, including timeout.
    pub async fn request<F>(
        &mut self,
        build: F,
        deadline: Instant,
    ) -> Result<ResponseFrame, RequestError>
    where
        F: FnOnce(u64) -> RequestFrame,
    {
        let (id, rx) = self.pending.register();
        let frame = build(id);

        if let Err(e) = self.send(&frame).await {
            self.pending.cancel(id);
            return Err(RequestError::Transport(e.to_string()));
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Err(_elapsed) => {
                self.pending.cancel(id);
                Err(RequestError::Timeout)
            }
            Ok(Err(_closed)) => Err(RequestError::ConnectionLost(
                "connection closed before response".to_string(),
            )),
            Ok(Ok(response)) => Ok(response),
        }
    }

    /// Receive the next connection event. `None` after the reader is gone.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }

    /// Close the connection. Idempotent; always safe to call again.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.fail_all();
        let _ = self.sink.send(Message::Close(None)).await;
        tracing::debug!("coordinator connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.pending.fail_all();
    }
}

/// Reader loop: decodes inbound frames, routes responses, forwards pushes,
/// and terminates with exactly one `Error` or `Closed` event.
async fn read_loop(
    mut stream: SplitStream<WsStream>,
    pending: Arc<PendingRequests>,
    events: mpsc::Sender<ConnectionEvent>,
) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match protocol::decode_inbound(text.as_str()) {
                Ok(InboundFrame::Response(response)) => {
                    let id = response.id;
                    if !pending.settle(response) {
                        tracing::warn!(id, "dropping response with no pending request");
                    }
                }
                Ok(InboundFrame::Push(push)) => {
                    if events.try_send(ConnectionEvent::Push(push)).is_err() {
                        tracing::warn!("event buffer full, dropping push message");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping invalid inbound frame");
                }
            },
            Some(Ok(Message::Binary(_))) => {
                tracing::warn!(
                    error = %ProtocolError::UnsupportedFrame("binary"),
                    "dropping inbound frame"
                );
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                    None => (None, String::new()),
                };
                pending.fail_all();
                let _ = events.send(ConnectionEvent::Closed { code, reason }).await;
                return;
            }
            Some(Err(e)) => {
                pending.fail_all();
                let _ = events.send(ConnectionEvent::Error(e.to_string())).await;
                return;
            }
            None => {
                pending.fail_all();
                let _ = events
                    .send(ConnectionEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    })
                    .await;
                return;
            }
        }
    }
}

/// Validate a coordinator endpoint before dialing.
pub(crate) fn validate_ws_endpoint(endpoint: &str) -> Result<(), SessionError> {
    let parsed = Url::parse(endpoint).map_err(|e| SessionError::InvalidEndpoint {
        url: endpoint.to_string(),
        reason: format!("URL parse failed: {e}"),
    })?;

    let scheme = parsed.scheme();
    if scheme != "ws" && scheme != "wss" {
        return Err(SessionError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: format!("scheme '{scheme}' is not allowed (allowed: ws, wss)"),
        });
    }
    if parsed.host_str().is_none() {
        return Err(SessionError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: "URL is missing host".to_string(),
        });
    }
    Ok(())
}

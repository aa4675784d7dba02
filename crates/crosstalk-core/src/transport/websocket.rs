//! WebSocket transport: one envelope per text message.
//!
//! Ping/pong frames are transport noise and skipped; binary frames are not
//! part of the protocol and skipped with a warning. A close frame from the
//! remote side surfaces as [`TransportError::Closed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::TransportError;

use super::TransportBackend;

const DUPLEX_BUFFER: usize = 64 * 1024;

type BoxedSink = Box<dyn Sink<Message, Error = WsError> + Send + Unpin>;
type BoxedStream = Box<dyn Stream<Item = Result<Message, WsError>> + Send + Unpin>;

/// Transport over an established WebSocket connection, client or server side.
#[derive(Clone)]
pub struct WebSocketTransport {
    inner: Arc<WsInner>,
}

struct WsInner {
    sink: Mutex<BoxedSink>,
    stream: Mutex<BoxedStream>,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Wrap a connection that already completed its handshake.
    pub fn new<S>(socket: WebSocketStream<S>) -> WebSocketTransport
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (sink, stream) = socket.split();
        WebSocketTransport {
            inner: Arc::new(WsInner {
                sink: Mutex::new(Box::new(sink)),
                stream: Mutex::new(Box::new(stream)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Connected pair over an in-memory pipe, handshake included. Test
    /// helper; panics if the handshake fails, which in-memory it cannot.
    pub async fn pair() -> (WebSocketTransport, WebSocketTransport) {
        let (client_io, server_io) = tokio::io::duplex(DUPLEX_BUFFER);
        let (client, server) = tokio::join!(
            async {
                let (socket, _response) =
                    tokio_tungstenite::client_async("ws://localhost/", client_io)
                        .await
                        .expect("in-memory websocket handshake (client)");
                socket
            },
            async {
                tokio_tungstenite::accept_async(server_io)
                    .await
                    .expect("in-memory websocket handshake (server)")
            },
        );
        (WebSocketTransport::new(client), WebSocketTransport::new(server))
    }
}

fn map_ws_error(e: WsError) -> TransportError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::Disconnected
        }
        WsError::Io(e) => TransportError::Io(e),
        other => TransportError::Io(std::io::Error::other(other)),
    }
}

impl TransportBackend for WebSocketTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut sink = self.inner.sink.lock().await;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(map_ws_error)
    }

    async fn recv_text(&self) -> Result<String, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut stream = self.inner.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Close(_))) => {
                    self.inner.closed.store(true, Ordering::SeqCst);
                    return Err(TransportError::Closed);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(other)) => {
                    tracing::warn!(kind = ?other, "skipping non-text websocket message");
                    continue;
                }
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => return Err(TransportError::Disconnected),
            }
        }
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut sink = self.inner.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.flush().await;
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

//! Transport backends.
//!
//! A transport moves whole UTF-8 text messages in both directions; framing is
//! the backend's concern, envelope semantics live above in
//! [`Channel`](crate::Channel). Backends are feature-gated modules behind the
//! [`Transport`] enum so the rest of the crate stays monomorphic.

use std::future::Future;

use crate::TransportError;

/// In-process transport backend.
#[cfg(feature = "mem")]
pub mod mem;
/// Byte-stream transport backend with newline framing.
#[cfg(feature = "stream")]
pub mod stream;
/// WebSocket transport backend.
#[cfg(feature = "websocket")]
pub mod websocket;

/// Contract every backend implements.
///
/// `recv_text` reports clean shutdown as [`TransportError::Closed`] and a
/// vanished remote endpoint as [`TransportError::Disconnected`].
pub(crate) trait TransportBackend: Send + Sync + Clone + 'static {
    fn send_text(&self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;
    fn recv_text(&self) -> impl Future<Output = Result<String, TransportError>> + Send;
    fn close(&self) -> impl Future<Output = ()> + Send;
    fn is_closed(&self) -> bool;
}

/// A duplex text-message transport.
#[derive(Debug, Clone)]
pub enum Transport {
    /// In-process channel pair, for tests and same-process peers.
    #[cfg(feature = "mem")]
    Mem(mem::MemTransport),
    /// Newline-delimited JSON over any duplex byte-stream.
    #[cfg(feature = "stream")]
    Stream(stream::StreamTransport),
    /// One envelope per WebSocket text message.
    #[cfg(feature = "websocket")]
    WebSocket(websocket::WebSocketTransport),
}

impl Transport {
    /// Connected in-process pair.
    #[cfg(feature = "mem")]
    pub fn mem_pair() -> (Transport, Transport) {
        let (a, b) = mem::MemTransport::pair();
        (Transport::Mem(a), Transport::Mem(b))
    }

    /// Wrap a duplex byte-stream with newline-delimited framing.
    #[cfg(feature = "stream")]
    pub fn stream<S>(io: S) -> Transport
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Sync + Unpin + 'static,
    {
        Transport::Stream(stream::StreamTransport::new(io))
    }

    /// Connected stream pair over an in-memory duplex pipe.
    #[cfg(feature = "stream")]
    pub fn stream_pair() -> (Transport, Transport) {
        let (a, b) = stream::StreamTransport::pair();
        (Transport::Stream(a), Transport::Stream(b))
    }

    /// Wrap an established WebSocket connection.
    #[cfg(feature = "websocket")]
    pub fn websocket<S>(socket: tokio_tungstenite::WebSocketStream<S>) -> Transport
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        Transport::WebSocket(websocket::WebSocketTransport::new(socket))
    }

    /// Connected WebSocket pair over an in-memory duplex pipe, handshake
    /// included. Test helper.
    #[cfg(feature = "websocket")]
    pub async fn websocket_pair() -> (Transport, Transport) {
        let (a, b) = websocket::WebSocketTransport::pair().await;
        (Transport::WebSocket(a), Transport::WebSocket(b))
    }

    /// Send one text message. Awaits under backpressure.
    pub async fn send_text(&self, text: String) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.send_text(text).await,
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.send_text(text).await,
            #[cfg(feature = "websocket")]
            Transport::WebSocket(t) => t.send_text(text).await,
        }
    }

    /// Receive the next text message.
    pub async fn recv_text(&self) -> Result<String, TransportError> {
        match self {
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.recv_text().await,
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.recv_text().await,
            #[cfg(feature = "websocket")]
            Transport::WebSocket(t) => t.recv_text().await,
        }
    }

    /// Shut the transport down cleanly.
    pub async fn close(&self) {
        match self {
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.close().await,
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.close().await,
            #[cfg(feature = "websocket")]
            Transport::WebSocket(t) => t.close().await,
        }
    }

    /// True once the transport has been closed locally or remotely.
    pub fn is_closed(&self) -> bool {
        match self {
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.is_closed(),
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.is_closed(),
            #[cfg(feature = "websocket")]
            Transport::WebSocket(t) => t.is_closed(),
        }
    }
}

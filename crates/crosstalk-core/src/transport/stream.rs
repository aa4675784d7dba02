//! Newline-delimited JSON over any duplex byte-stream.
//!
//! One envelope per line. `serde_json` never emits a raw newline inside a
//! document, so the framing cannot be broken by payload content.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::TransportError;

use super::TransportBackend;

const DUPLEX_BUFFER: usize = 64 * 1024;

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Sync + Unpin>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// Transport over a split byte-stream, reader and writer behind separate
/// locks so sends never wait on an in-progress read.
#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    reader: Mutex<BoxedReader>,
    writer: Mutex<BoxedWriter>,
    closed: AtomicBool,
}

impl StreamTransport {
    /// Wrap a duplex stream.
    pub fn new<S>(io: S) -> StreamTransport
    where
        S: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        StreamTransport {
            inner: Arc::new(StreamInner {
                reader: Mutex::new(BufReader::new(Box::new(read_half))),
                writer: Mutex::new(Box::new(write_half)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Connected pair over an in-memory pipe. Test helper.
    pub fn pair() -> (StreamTransport, StreamTransport) {
        let (a, b) = tokio::io::duplex(DUPLEX_BUFFER);
        (StreamTransport::new(a), StreamTransport::new(b))
    }
}

fn map_io_error(e: std::io::Error) -> TransportError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
            TransportError::Disconnected
        }
        _ => TransportError::Io(e),
    }
}

impl TransportBackend for StreamTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(text.as_bytes()).await.map_err(map_io_error)?;
        writer.write_all(b"\n").await.map_err(map_io_error)?;
        writer.flush().await.map_err(map_io_error)
    }

    async fn recv_text(&self) -> Result<String, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut reader = self.inner.reader.lock().await;
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.map_err(map_io_error)?;
        if n == 0 {
            return Err(TransportError::Disconnected);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

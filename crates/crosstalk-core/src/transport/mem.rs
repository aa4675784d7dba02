//! In-process transport over a pair of mpsc channels.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::TransportError;

use super::TransportBackend;

const CHANNEL_CAPACITY: usize = 64;

/// One endpoint of an in-process pair. Dropping every clone of an endpoint
/// disconnects the other side abruptly; `close` is the clean variant.
#[derive(Debug, Clone)]
pub struct MemTransport {
    inner: Arc<MemInner>,
}

#[derive(Debug)]
struct MemInner {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    closed: AtomicBool,
}

impl MemTransport {
    /// Connected pair of endpoints.
    pub fn pair() -> (MemTransport, MemTransport) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);
        let a = MemTransport {
            inner: Arc::new(MemInner {
                tx: tx_a,
                rx: Mutex::new(rx_b),
                closed: AtomicBool::new(false),
            }),
        };
        let b = MemTransport {
            inner: Arc::new(MemInner {
                tx: tx_b,
                rx: Mutex::new(rx_a),
                closed: AtomicBool::new(false),
            }),
        };
        (a, b)
    }
}

impl TransportBackend for MemTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.inner
            .tx
            .send(text)
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    async fn recv_text(&self) -> Result<String, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut rx = self.inner.rx.lock().await;
        match rx.recv().await {
            Some(text) => Ok(text),
            None => Err(TransportError::Disconnected),
        }
    }

    fn close(&self) -> impl Future<Output = ()> + Send {
        self.inner.closed.store(true, Ordering::SeqCst);
        std::future::ready(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

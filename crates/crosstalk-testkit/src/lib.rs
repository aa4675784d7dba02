//! Reusable test harness for crosstalk peers and transports.
//!
//! A transport backend is conformant when every runner in this crate passes
//! against its [`TransportFactory`]. The runners drive full peer sessions,
//! so they cover the envelope codec, correlation and close behavior, not
//! just byte movement.

use std::fmt;
use std::future::Future;

use serde_json::{json, Value};

use crosstalk_core::{CallError, Channel, CloseReason, Peer, Registry, Transport};

pub mod bidirectional;

pub use bidirectional::{run_bidirectional_scenario, BidirectionalScenario};

/// Produces connected transport pairs for a backend under test.
pub trait TransportFactory {
    /// A fresh connected pair.
    fn connect_pair() -> impl Future<Output = (Transport, Transport)> + Send;
}

/// In-process channel pair.
pub struct MemFactory;

impl TransportFactory for MemFactory {
    async fn connect_pair() -> (Transport, Transport) {
        Transport::mem_pair()
    }
}

/// Newline-delimited JSON over an in-memory duplex pipe.
pub struct StreamFactory;

impl TransportFactory for StreamFactory {
    async fn connect_pair() -> (Transport, Transport) {
        Transport::stream_pair()
    }
}

/// Real WebSocket handshake over an in-memory duplex pipe.
pub struct WebSocketFactory;

impl TransportFactory for WebSocketFactory {
    async fn connect_pair() -> (Transport, Transport) {
        Transport::websocket_pair().await
    }
}

/// Harness failure: either a call failed or an assertion did not hold.
#[derive(Debug)]
pub enum TestError {
    /// A call that was expected to succeed failed.
    Call(CallError),
    /// An observed value differed from the expectation.
    Assertion(String),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Call(e) => write!(f, "call failed: {e}"),
            TestError::Assertion(msg) => write!(f, "assertion failed: {msg}"),
        }
    }
}

impl std::error::Error for TestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TestError::Call(e) => Some(e),
            TestError::Assertion(_) => None,
        }
    }
}

impl From<CallError> for TestError {
    fn from(e: CallError) -> Self {
        TestError::Call(e)
    }
}

fn expect_eq(actual: &Value, expected: &Value) -> Result<(), TestError> {
    if actual == expected {
        Ok(())
    } else {
        Err(TestError::Assertion(format!(
            "expected {expected}, got {actual}"
        )))
    }
}

fn spawn_peer(transport: Transport, registry: Registry) -> Peer {
    let (peer, driver) = Peer::new(Channel::new(transport), registry);
    tokio::spawn(driver.run());
    peer
}

fn echo_registry() -> Registry {
    let mut registry = Registry::new();
    // Handlers silently tolerate missing arguments; the runners always pass
    // exactly one.
    let exposed = registry.expose_fn("echo", |mut args| async move {
        Ok(args.drain(..).next().unwrap_or(Value::Null))
    });
    debug_assert!(exposed.is_ok());
    registry
}

/// One call, one response, correct value.
pub async fn run_round_trip<F: TransportFactory>() -> Result<(), TestError> {
    let (serving_side, calling_side) = F::connect_pair().await;
    let _server = spawn_peer(serving_side, echo_registry());
    let caller = spawn_peer(calling_side, Registry::new());

    let ret = caller.call("echo", vec![json!("ping")]).await?;
    expect_eq(&ret, &json!("ping"))
}

/// Calling a name nobody registered must fail remotely and leave the session
/// usable.
pub async fn run_unknown_function<F: TransportFactory>() -> Result<(), TestError> {
    let (serving_side, calling_side) = F::connect_pair().await;
    let _server = spawn_peer(serving_side, echo_registry());
    let caller = spawn_peer(calling_side, Registry::new());

    match caller.call("missing", vec![]).await {
        Err(CallError::Remote(payload)) => {
            expect_eq(&payload["kind"], &json!("function_not_found"))?;
        }
        Ok(v) => {
            return Err(TestError::Assertion(format!(
                "unknown function returned {v}"
            )))
        }
        Err(other) => {
            return Err(TestError::Assertion(format!(
                "expected a remote error, got {other}"
            )))
        }
    }

    let ret = caller.call("echo", vec![json!(1)]).await?;
    expect_eq(&ret, &json!(1))
}

/// Dropping the remote endpoint mid-call must fail the pending call with
/// [`CallError::ConnectionClosed`] and end the driver with
/// [`CloseReason::ConnectionLost`].
pub async fn run_disconnect_drain<F: TransportFactory>() -> Result<(), TestError> {
    let (near_side, far_side) = F::connect_pair().await;
    let (near, driver) = Peer::new(Channel::new(near_side), Registry::new());
    let driver_task = tokio::spawn(driver.run());

    let waiter = {
        let near = near.clone();
        tokio::spawn(async move { near.call("unanswered", vec![]).await })
    };
    // Wait for the call to reach the wire, then vanish without a close.
    far_side
        .recv_text()
        .await
        .map_err(|e| TestError::Assertion(format!("far side never saw the call: {e}")))?;
    drop(far_side);

    let result = waiter
        .await
        .map_err(|e| TestError::Assertion(format!("waiter task failed: {e}")))?;
    match result {
        Err(CallError::ConnectionClosed) => {}
        other => {
            return Err(TestError::Assertion(format!(
                "expected ConnectionClosed, got {other:?}"
            )))
        }
    }
    let reason = driver_task
        .await
        .map_err(|e| TestError::Assertion(format!("driver task failed: {e}")))?;
    if reason != CloseReason::ConnectionLost {
        return Err(TestError::Assertion(format!(
            "expected ConnectionLost, got {reason:?}"
        )));
    }
    Ok(())
}

/// A local close must surface on the remote side as a graceful end.
pub async fn run_graceful_close<F: TransportFactory>() -> Result<(), TestError> {
    let (near_side, far_side) = F::connect_pair().await;
    let (near, near_driver) = Peer::new(Channel::new(near_side), Registry::new());
    let near_task = tokio::spawn(near_driver.run());
    let (_far, far_driver) = Peer::new(Channel::new(far_side), Registry::new());
    let far_task = tokio::spawn(far_driver.run());

    near.close().await;

    let near_reason = near_task
        .await
        .map_err(|e| TestError::Assertion(format!("near driver failed: {e}")))?;
    let far_reason = far_task
        .await
        .map_err(|e| TestError::Assertion(format!("far driver failed: {e}")))?;
    if near_reason != CloseReason::LocalClose {
        return Err(TestError::Assertion(format!(
            "expected LocalClose near, got {near_reason:?}"
        )));
    }
    if far_reason != CloseReason::RemoteClose {
        return Err(TestError::Assertion(format!(
            "expected RemoteClose far, got {far_reason:?}"
        )));
    }
    Ok(())
}

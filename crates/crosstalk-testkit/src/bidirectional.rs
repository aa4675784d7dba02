//! Scenarios where the serving peer calls back into its caller while the
//! original call is still in flight. These catch drivers that block on
//! inbound dispatch: the caller must keep serving its own registry while it
//! waits for the outer response.

use std::sync::{Arc, OnceLock};

use serde_json::{json, Value};

use crosstalk_core::{Channel, HandlerError, Peer, Registry, Transport};

use crate::{expect_eq, TestError, TransportFactory};

/// Callback patterns exercised by [`run_bidirectional_scenario`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidirectionalScenario {
    /// Caller invokes the server; no callback. Baseline.
    SimpleEcho,
    /// The server's handler calls one function on the caller before
    /// answering.
    NestedCallback,
    /// The server's handler calls back several times sequentially, so
    /// multiple nested exchanges complete inside one outer call.
    MultipleNestedCallbacks,
}

/// Handle cell filled after peer construction. Handlers registered before
/// the peer exists grab the handle through this; the driver is not spawned
/// until the cell is set, so a dispatching handler always finds it.
type PeerCell = Arc<OnceLock<Peer>>;

fn callback_peer(cell: &PeerCell) -> Result<Peer, HandlerError> {
    cell.get()
        .cloned()
        .ok_or_else(|| HandlerError::msg("peer handle not initialized"))
}

fn spawn_with_cell(transport: Transport, registry: Registry) -> Peer {
    let (peer, driver) = Peer::new(Channel::new(transport), registry);
    tokio::spawn(driver.run());
    peer
}

/// Run one scenario over a fresh transport pair from `F`.
pub async fn run_bidirectional_scenario<F: TransportFactory>(
    scenario: BidirectionalScenario,
) -> Result<(), TestError> {
    let (server_side, caller_side) = F::connect_pair().await;
    match scenario {
        BidirectionalScenario::SimpleEcho => {
            let mut server_registry = Registry::new();
            server_registry
                .expose_fn("echo", |mut args| async move {
                    Ok(args.drain(..).next().unwrap_or(Value::Null))
                })
                .map_err(|e| TestError::Assertion(e.to_string()))?;
            let _server = spawn_with_cell(server_side, server_registry);
            let caller = spawn_with_cell(caller_side, Registry::new());

            let ret = caller.call("echo", vec![json!("hello")]).await?;
            expect_eq(&ret, &json!("hello"))
        }

        BidirectionalScenario::NestedCallback => {
            let server_cell: PeerCell = Arc::new(OnceLock::new());
            let mut server_registry = Registry::new();
            {
                let cell = server_cell.clone();
                server_registry
                    .expose_fn("format", move |args| {
                        let cell = cell.clone();
                        async move {
                            let peer = callback_peer(&cell)?;
                            let prefix = peer
                                .call("prefix", vec![])
                                .await
                                .map_err(|e| HandlerError::msg(e.to_string()))?;
                            let prefix = prefix.as_str().unwrap_or("?");
                            let arg = args.first().and_then(Value::as_str).unwrap_or("?");
                            Ok(json!(format!("{prefix}-{arg}")))
                        }
                    })
                    .map_err(|e| TestError::Assertion(e.to_string()))?;
            }
            let (server, server_driver) = Peer::new(Channel::new(server_side), server_registry);
            let _ = server_cell.set(server);
            tokio::spawn(server_driver.run());

            let mut caller_registry = Registry::new();
            caller_registry
                .expose_fn("prefix", |_| async { Ok(json!("pre")) })
                .map_err(|e| TestError::Assertion(e.to_string()))?;
            let caller = spawn_with_cell(caller_side, caller_registry);

            let ret = caller.call("format", vec![json!("body")]).await?;
            expect_eq(&ret, &json!("pre-body"))
        }

        BidirectionalScenario::MultipleNestedCallbacks => {
            let server_cell: PeerCell = Arc::new(OnceLock::new());
            let mut server_registry = Registry::new();
            {
                let cell = server_cell.clone();
                server_registry
                    .expose_fn("assemble", move |_args| {
                        let cell = cell.clone();
                        async move {
                            let peer = callback_peer(&cell)?;
                            let mut parts = Vec::new();
                            for i in 0..3i64 {
                                let part = peer
                                    .call("part", vec![json!(i)])
                                    .await
                                    .map_err(|e| HandlerError::msg(e.to_string()))?;
                                parts.push(part.as_str().unwrap_or("?").to_owned());
                            }
                            Ok(json!(parts.join("+")))
                        }
                    })
                    .map_err(|e| TestError::Assertion(e.to_string()))?;
            }
            let (server, server_driver) = Peer::new(Channel::new(server_side), server_registry);
            let _ = server_cell.set(server);
            tokio::spawn(server_driver.run());

            let mut caller_registry = Registry::new();
            caller_registry
                .expose_fn("part", |args| async move {
                    let i = args.first().and_then(Value::as_i64).unwrap_or(-1);
                    Ok(json!(format!("p{i}")))
                })
                .map_err(|e| TestError::Assertion(e.to_string()))?;
            let caller = spawn_with_cell(caller_side, caller_registry);

            let ret = caller.call("assemble", vec![]).await?;
            expect_eq(&ret, &json!("p0+p1+p2"))
        }
    }
}

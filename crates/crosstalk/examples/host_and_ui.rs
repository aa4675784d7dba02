//! Two peers in one process: a host exposing functions and a UI calling
//! them, with a callback in the other direction.
//!
//! Run with `RUST_LOG=debug` to watch the envelope traffic.

use serde_json::json;

use crosstalk::{remote_client, Channel, CloseReason, Peer, Registry, SessionHooks, Transport};

remote_client! {
    /// What the UI sees of the host.
    pub struct HostClient {
        async fn add(a: i64, b: i64) -> i64;
        async fn window_title() -> String;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (host_side, ui_side) = Transport::mem_pair();

    // Host peer: exposes functions, calls back into the UI for its name.
    let mut host_registry = Registry::new();
    host_registry.expose_fn("add", |args| async move {
        let a = args[0].as_i64().unwrap_or(0);
        let b = args[1].as_i64().unwrap_or(0);
        Ok(json!(a + b))
    })?;
    host_registry.expose_fn("window_title", |_| async {
        Ok(json!("crosstalk demo"))
    })?;
    let hooks = SessionHooks::new()
        .on_session_open(|| println!("host: session open"))
        .on_session_close(|reason: CloseReason| println!("host: session closed ({reason:?})"));
    let (_host_peer, host_driver) = Peer::with_hooks(Channel::new(host_side), host_registry, hooks);
    tokio::spawn(host_driver.run());

    // UI peer: exposes nothing, drives the host through a typed client.
    let (ui_peer, ui_driver) = Peer::new(Channel::new(ui_side), Registry::new());
    tokio::spawn(ui_driver.run());
    let host = HostClient::new(ui_peer);

    println!("2 + 3 = {}", host.add(2, 3).await?);
    println!("title  = {}", host.window_title().await?);

    host.peer().close().await;
    Ok(())
}

//! Bidirectional call/return RPC between a host process and a UI process.
//!
//! Both sides of a connection are peers: each exposes functions in a
//! [`Registry`] and invokes the other side's functions through a [`Peer`]
//! handle. Calls from both directions interleave freely and responses are
//! matched by id, so a slow handler never delays an unrelated reply.
//!
//! # Quick start
//!
//! ```
//! use crosstalk::{remote_client, Channel, Peer, Registry, Transport};
//! use serde_json::json;
//!
//! remote_client! {
//!     /// Functions the host exposes to the UI.
//!     pub struct HostClient {
//!         async fn add(a: i64, b: i64) -> i64;
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (host_side, ui_side) = Transport::mem_pair();
//!
//! let mut registry = Registry::new();
//! registry.expose_fn("add", |args| async move {
//!     let a = args[0].as_i64().unwrap_or(0);
//!     let b = args[1].as_i64().unwrap_or(0);
//!     Ok(json!(a + b))
//! })?;
//! let (_host, host_driver) = Peer::new(Channel::new(host_side), registry);
//! tokio::spawn(host_driver.run());
//!
//! let (ui_peer, ui_driver) = Peer::new(Channel::new(ui_side), Registry::new());
//! tokio::spawn(ui_driver.run());
//!
//! let host = HostClient::new(ui_peer);
//! assert_eq!(host.add(2, 3).await?, 5);
//! # Ok(())
//! # }
//! ```
//!
//! The dynamic primitive behind the typed client is [`Peer::call`], which
//! takes a function name and JSON arguments directly.

mod macros;

pub use crosstalk_core::{
    CallError, CallId, Channel, ChannelEvent, CloseReason, Envelope, Handler, HandlerError,
    HandlerFuture, Peer, PeerDriver, PendingError, Registry, RegistryError, SessionHooks,
    Transport, TransportError,
};

// Macro-generated code refers to serde_json through the facade.
#[doc(hidden)]
pub use serde_json;

/// Common imports for applications.
pub mod prelude {
    pub use crate::{
        CallError, Channel, CloseReason, HandlerError, Peer, Registry, SessionHooks, Transport,
    };
}

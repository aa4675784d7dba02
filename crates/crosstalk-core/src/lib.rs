//! Core protocol for crosstalk: bidirectional call/return RPC between two
//! peers over a duplex text-message transport.
//!
//! Either peer invokes functions the other has registered; responses are
//! correlated by call id, not arrival order, so calls from both directions
//! interleave freely. The wire format is one JSON envelope per transport
//! message (`call` / `return` / `error` / `close`).
//!
//! # Quick start
//!
//! ```
//! use crosstalk_core::{Channel, Peer, Registry, Transport};
//! use serde_json::json;
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
//! let (ui, ui_driver) = Peer::new(Channel::new(ui_side), Registry::new());
//! tokio::spawn(ui_driver.run());
//!
//! let sum = ui.call("add", vec![json!(2), json!(3)]).await?;
//! assert_eq!(sum, json!(5));
//! # Ok(())
//! # }
//! ```

mod channel;
mod error;
mod peer;
mod pending;
mod registry;
pub mod transport;
mod wire;

pub use channel::{Channel, ChannelEvent};
pub use error::{CallError, PendingError, RegistryError, TransportError};
pub use peer::{CloseReason, Peer, PeerDriver, SessionHooks};
pub use pending::{PendingCalls, RegisterFailure, ResponseSender};
pub use registry::{Handler, HandlerError, HandlerFuture, Registry};
pub use transport::Transport;
pub use wire::{CallId, CallIdGenerator, Envelope};

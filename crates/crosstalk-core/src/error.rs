//! Error types for crosstalk.

use std::fmt;

use serde_json::Value;

use crate::CallId;

/// Transport-level errors. These are local conditions around the wire itself
/// and are reported immediately, never retried.
#[derive(Debug)]
pub enum TransportError {
    /// Send attempted before the channel reached the open state.
    NotOpen,
    /// The transport was shut down cleanly, locally or by the remote side.
    Closed,
    /// The remote endpoint vanished without a clean shutdown.
    Disconnected,
    /// I/O error from the underlying stream.
    Io(std::io::Error),
    /// The envelope could not be serialized to wire text.
    Encode(serde_json::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotOpen => write!(f, "channel is not open"),
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Disconnected => write!(f, "remote endpoint disconnected"),
            TransportError::Io(e) => write!(f, "transport I/O error: {e}"),
            TransportError::Encode(e) => write!(f, "failed to encode envelope: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Errors surfaced by [`Peer::call`](crate::Peer::call).
#[derive(Debug)]
pub enum CallError {
    /// The call never left this process.
    Transport(TransportError),
    /// The remote handler failed; carries the remote-supplied description.
    Remote(Value),
    /// The connection was lost while the call was in flight.
    ConnectionClosed,
    /// The session was shut down cleanly while the call was in flight.
    GracefulClose,
    /// The pending-call table is full.
    TooManyPending {
        /// Configured capacity at the time of refusal.
        max: usize,
    },
    /// An argument could not be converted to a JSON value.
    Serialize(serde_json::Error),
    /// The returned value could not be converted to the requested type.
    Deserialize(serde_json::Error),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Transport(e) => write!(f, "transport error: {e}"),
            CallError::Remote(v) => write!(f, "remote handler failed: {v}"),
            CallError::ConnectionClosed => write!(f, "connection closed"),
            CallError::GracefulClose => write!(f, "session closed gracefully"),
            CallError::TooManyPending { max } => {
                write!(f, "too many pending calls (max {max})")
            }
            CallError::Serialize(e) => write!(f, "failed to serialize argument: {e}"),
            CallError::Deserialize(e) => write!(f, "failed to deserialize return value: {e}"),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Transport(e) => Some(e),
            CallError::Serialize(e) | CallError::Deserialize(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for CallError {
    fn from(e: TransportError) -> Self {
        CallError::Transport(e)
    }
}

/// Registration-time errors. These are programmer errors and fail fast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler is already registered under this name. The existing handler
    /// stays in place.
    AlreadyRegistered {
        /// The conflicting name.
        name: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyRegistered { name } => {
                write!(f, "function {name:?} is already registered")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Correlation-table conditions. Never propagated to the wire: duplicates are
/// invariant violations, unknown ids are logged and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingError {
    /// An entry already exists under this id.
    Duplicate(CallId),
    /// No entry exists under this id. Covers duplicate delivery and responses
    /// arriving after the table was drained.
    Unknown(CallId),
    /// The table is at capacity.
    Capacity {
        /// Configured capacity at the time of refusal.
        max: usize,
    },
}

impl fmt::Display for PendingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingError::Duplicate(id) => write!(f, "call id {id} is already pending"),
            PendingError::Unknown(id) => write!(f, "no pending call with id {id}"),
            PendingError::Capacity { max } => {
                write!(f, "pending-call table is full (max {max})")
            }
        }
    }
}

impl std::error::Error for PendingError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_formats() {
        assert_eq!(TransportError::NotOpen.to_string(), "channel is not open");
        assert_eq!(
            CallError::Remote(json!({"kind": "handler_error"})).to_string(),
            r#"remote handler failed: {"kind":"handler_error"}"#
        );
        assert_eq!(
            RegistryError::AlreadyRegistered { name: "add".into() }.to_string(),
            r#"function "add" is already registered"#
        );
        assert_eq!(
            PendingError::Unknown("9".into()).to_string(),
            "no pending call with id 9"
        );
    }

    #[test]
    fn sources_chain() {
        use std::error::Error as _;
        let io = std::io::Error::other("boom");
        let err = CallError::Transport(TransportError::Io(io));
        assert!(err.source().is_some());
        assert!(CallError::ConnectionClosed.source().is_none());
    }
}

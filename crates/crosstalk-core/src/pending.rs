//! Pending-call table: correlation ids to response continuations.
//!
//! Owned exclusively by the peer driver; nothing here locks. An entry is
//! created before the matching `call` envelope goes out, so a response can
//! never arrive ahead of its waiter, and is consumed exactly once by the
//! matching `return`/`error` envelope or by a drain on session close.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::{CallError, CallId, PendingError};

/// Completion side of one in-flight call.
pub type ResponseSender = oneshot::Sender<Result<Value, CallError>>;

const DEFAULT_MAX_PENDING: usize = 8192;

/// Maximum in-flight calls, overridable via `CROSSTALK_MAX_PENDING`.
fn max_pending() -> usize {
    std::env::var("CROSSTALK_MAX_PENDING")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MAX_PENDING)
}

/// Returned by [`PendingCalls::register`] on failure, handing the sender back
/// so the caller can fail the waiting future instead of dropping it silently.
#[derive(Debug)]
pub struct RegisterFailure {
    /// What went wrong.
    pub error: PendingError,
    /// The continuation that was not registered.
    pub sender: ResponseSender,
}

/// Map of in-flight outbound calls.
#[derive(Debug)]
pub struct PendingCalls {
    entries: HashMap<CallId, ResponseSender>,
    max: usize,
}

impl PendingCalls {
    /// Table with the environment-configured capacity.
    pub fn new() -> Self {
        Self::with_limit(max_pending())
    }

    /// Table with an explicit capacity.
    pub fn with_limit(max: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max,
        }
    }

    /// Number of in-flight calls.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no calls are in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a continuation under `id`. Must happen before the `call`
    /// envelope is sent.
    pub fn register(&mut self, id: CallId, sender: ResponseSender) -> Result<(), RegisterFailure> {
        if self.entries.len() >= self.max {
            return Err(RegisterFailure {
                error: PendingError::Capacity { max: self.max },
                sender,
            });
        }
        if self.entries.contains_key(&id) {
            return Err(RegisterFailure {
                error: PendingError::Duplicate(id),
                sender,
            });
        }
        self.entries.insert(id, sender);
        Ok(())
    }

    /// Complete the call `id` with a value. The entry is removed; a second
    /// response for the same id reports [`PendingError::Unknown`].
    pub fn resolve(&mut self, id: CallId, value: Value) -> Result<(), PendingError> {
        match self.entries.remove(&id) {
            // The caller may have abandoned the future; a failed send is fine.
            Some(tx) => {
                let _ = tx.send(Ok(value));
                Ok(())
            }
            None => Err(PendingError::Unknown(id)),
        }
    }

    /// Complete the call `id` with an error.
    pub fn reject(&mut self, id: CallId, error: CallError) -> Result<(), PendingError> {
        match self.entries.remove(&id) {
            Some(tx) => {
                let _ = tx.send(Err(error));
                Ok(())
            }
            None => Err(PendingError::Unknown(id)),
        }
    }

    /// Fail every remaining entry. Used on session close so no caller hangs.
    /// Returns how many entries were drained.
    pub fn drain_all(&mut self, make_error: impl Fn() -> CallError) -> usize {
        let drained = self.entries.len();
        for (_, tx) in self.entries.drain() {
            let _ = tx.send(Err(make_error()));
        }
        drained
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

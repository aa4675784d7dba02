//! Function registry: names exposed to the remote peer.
//!
//! The registry is populated before the peer starts and is owned by the
//! driver afterwards. Names are arbitrary case-sensitive strings; duplicate
//! registration fails fast and leaves the first handler in place.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::RegistryError;

/// Failure description a handler ships back to the remote caller. The inner
/// JSON value travels verbatim in the `error` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerError(Value);

impl HandlerError {
    /// Wrap an arbitrary JSON description.
    pub fn new(description: Value) -> Self {
        HandlerError(description)
    }

    /// Convenience constructor for a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError(json!({
            "kind": "handler_error",
            "message": message.into(),
        }))
    }

    /// The JSON payload for the `error` envelope.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::msg(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::msg(message)
    }
}

/// Future returned by a handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// Boxed async handler: positional JSON arguments in, JSON value or failure
/// description out.
pub type Handler = Arc<dyn Fn(Vec<Value>) -> HandlerFuture + Send + Sync>;

/// Name to handler map.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Handler>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. Fails if the name is taken.
    pub fn expose(&mut self, name: impl Into<String>, handler: Handler) -> Result<(), RegistryError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Register a closure returning a future, without boxing at the call site.
    pub fn expose_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.expose(name, Arc::new(move |args| Box::pin(f(args))))
    }

    /// Register a batch of handlers. Stops at the first conflicting name;
    /// earlier entries stay registered.
    pub fn expose_map<I>(&mut self, entries: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = (String, Handler)>,
    {
        for (name, handler) in entries {
            self.expose(name, handler)?;
        }
        Ok(())
    }

    /// Look up a handler by name.
    pub fn lookup(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("names", &names).finish()
    }
}

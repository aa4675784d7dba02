//! Peer orchestration: one handle, one driver task.
//!
//! The driver exclusively owns the pending-call table, the registry and the
//! id generator. Everything reaches it through queues: a pump task forwards
//! channel events, and cloneable [`Peer`] handles enqueue commands. No map is
//! ever touched from two tasks.
//!
//! Inbound calls run in spawned tasks so a slow handler never stalls the
//! driver loop; responses correlate by id, never by arrival order.

use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::{
    CallError, CallId, CallIdGenerator, Channel, ChannelEvent, Envelope, PendingCalls,
    PendingError, Registry, Transport, TransportError,
};

const COMMAND_QUEUE_CAPACITY: usize = 64;
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The remote peer announced shutdown with a `close` envelope.
    RemoteClose,
    /// The transport shut down cleanly without a `close` envelope.
    TransportClean,
    /// The remote endpoint vanished.
    ConnectionLost,
    /// [`Peer::close`] was called.
    LocalClose,
}

impl CloseReason {
    /// True for every reason except [`CloseReason::ConnectionLost`].
    pub fn is_graceful(self) -> bool {
        !matches!(self, CloseReason::ConnectionLost)
    }
}

type OpenHook = Box<dyn FnOnce() + Send>;
type CloseHook = Box<dyn FnOnce(CloseReason) + Send>;

/// Session lifecycle callbacks, the host-integration boundary. A host that
/// should exit when the UI goes away hooks `on_session_close`.
#[derive(Default)]
pub struct SessionHooks {
    on_open: Option<OpenHook>,
    on_close: Option<CloseHook>,
}

impl SessionHooks {
    /// No callbacks.
    pub fn new() -> SessionHooks {
        SessionHooks::default()
    }

    /// Called once when the channel reaches the open state.
    pub fn on_session_open(mut self, f: impl FnOnce() + Send + 'static) -> SessionHooks {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Called once when the session ends, with the reason.
    pub fn on_session_close(mut self, f: impl FnOnce(CloseReason) + Send + 'static) -> SessionHooks {
        self.on_close = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHooks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

enum Command {
    Call {
        name: String,
        args: Vec<Value>,
        reply: oneshot::Sender<Result<Value, CallError>>,
    },
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Open,
    Closed,
}

/// Cloneable handle for invoking remote functions.
#[derive(Debug, Clone)]
pub struct Peer {
    commands: mpsc::Sender<Command>,
}

impl Peer {
    /// Build a peer over `channel` exposing `registry`. The returned driver
    /// must be spawned; the session lives as long as it runs.
    pub fn new(channel: Channel, registry: Registry) -> (Peer, PeerDriver) {
        Peer::with_hooks(channel, registry, SessionHooks::new())
    }

    /// [`Peer::new`] with lifecycle callbacks.
    pub fn with_hooks(
        channel: Channel,
        registry: Registry,
        hooks: SessionHooks,
    ) -> (Peer, PeerDriver) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let peer = Peer { commands: tx };
        let driver = PeerDriver {
            channel,
            commands: rx,
            registry,
            hooks,
        };
        (peer, driver)
    }

    /// Invoke `name` on the remote peer and wait for its response.
    ///
    /// There is no protocol-level timeout; wrap the future in
    /// `tokio::time::timeout` if the caller needs one. Abandoning the future
    /// is safe, a late response hits the unknown-id path and is ignored.
    pub async fn call(&self, name: impl Into<String>, args: Vec<Value>) -> Result<Value, CallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Call {
                name: name.into(),
                args,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CallError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| CallError::ConnectionClosed)?
    }

    /// Announce shutdown to the remote peer and end the session.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }
}

/// The session task. Owns the channel and both maps; created by
/// [`Peer::new`] and driven to completion with [`PeerDriver::run`].
#[derive(Debug)]
pub struct PeerDriver {
    channel: Channel,
    commands: mpsc::Receiver<Command>,
    registry: Registry,
    hooks: SessionHooks,
}

impl PeerDriver {
    /// Run the session until it closes. Returns why.
    pub async fn run(self) -> CloseReason {
        let PeerDriver {
            mut channel,
            commands,
            registry,
            mut hooks,
        } = self;
        let transport = channel.transport();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let pump = tokio::spawn(async move {
            loop {
                let event = channel.recv_event().await;
                let terminal = matches!(event, ChannelEvent::Closed { .. });
                if event_tx.send(event).await.is_err() || terminal {
                    break;
                }
            }
        });

        let mut state = DriverState {
            transport,
            registry,
            pending: PendingCalls::new(),
            ids: CallIdGenerator::default(),
            phase: Phase::Connecting,
            on_open: hooks.on_open.take(),
        };
        let reason = state.drive(event_rx, commands).await;
        // On local close the pump may still sit in recv; it has nothing left
        // to deliver.
        pump.abort();
        tracing::debug!(?reason, "session ended");
        if let Some(f) = hooks.on_close.take() {
            f(reason);
        }
        reason
    }
}

struct DriverState {
    transport: Transport,
    registry: Registry,
    pending: PendingCalls,
    ids: CallIdGenerator,
    phase: Phase,
    on_open: Option<OpenHook>,
}

impl DriverState {
    async fn drive(
        &mut self,
        mut events: mpsc::Receiver<ChannelEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) -> CloseReason {
        // The channel reports Open before anything else; commands queue up
        // behind it so an immediate call cannot observe Connecting.
        while self.phase == Phase::Connecting {
            match events.recv().await {
                Some(event) => {
                    if let Some(reason) = self.handle_event(event).await {
                        return reason;
                    }
                }
                None => return self.pump_gone(),
            }
        }

        let mut commands_open = true;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(reason) = self.handle_event(event).await {
                            return reason;
                        }
                    }
                    None => return self.pump_gone(),
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => {
                        if let Some(reason) = self.handle_command(command).await {
                            return reason;
                        }
                    }
                    // Every handle is gone; keep serving inbound traffic.
                    None => commands_open = false,
                },
            }
        }
    }

    /// The pump ended without delivering a terminal event. Only reachable if
    /// it was aborted or panicked, so treat it as a lost connection.
    fn pump_gone(&mut self) -> CloseReason {
        self.phase = Phase::Closed;
        self.pending.drain_all(|| CallError::ConnectionClosed);
        CloseReason::ConnectionLost
    }

    async fn handle_event(&mut self, event: ChannelEvent) -> Option<CloseReason> {
        match event {
            ChannelEvent::Open => {
                self.phase = Phase::Open;
                tracing::debug!("channel open");
                if let Some(f) = self.on_open.take() {
                    f();
                }
                None
            }
            ChannelEvent::Message(envelope) => self.handle_envelope(envelope).await,
            ChannelEvent::Closed { was_clean } => {
                self.phase = Phase::Closed;
                let (reason, drained) = if was_clean {
                    (
                        CloseReason::TransportClean,
                        self.pending.drain_all(|| CallError::GracefulClose),
                    )
                } else {
                    (
                        CloseReason::ConnectionLost,
                        self.pending.drain_all(|| CallError::ConnectionClosed),
                    )
                };
                if drained > 0 {
                    tracing::debug!(drained, ?reason, "drained pending calls on channel close");
                }
                Some(reason)
            }
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) -> Option<CloseReason> {
        match envelope {
            Envelope::Call { id, name, args } => {
                self.dispatch_call(id, name, args).await;
                None
            }
            Envelope::Return { id, ret } => {
                if let Err(e) = self.pending.resolve(id, ret) {
                    tracing::warn!(error = %e, "ignoring response with no pending call");
                }
                None
            }
            Envelope::Error { id, error } => {
                if let Err(e) = self.pending.reject(id, CallError::Remote(error)) {
                    tracing::warn!(error = %e, "ignoring error with no pending call");
                }
                None
            }
            Envelope::Close => {
                self.phase = Phase::Closed;
                let drained = self.pending.drain_all(|| CallError::GracefulClose);
                tracing::debug!(drained, "remote peer closed the session");
                self.transport.close().await;
                Some(CloseReason::RemoteClose)
            }
        }
    }

    async fn dispatch_call(&mut self, id: CallId, name: String, args: Vec<Value>) {
        tracing::debug!(id = %id, name = %name, argc = args.len(), "inbound call");
        let Some(handler) = self.registry.lookup(&name) else {
            let reply = Envelope::Error {
                id,
                error: function_not_found(&name),
            };
            if let Err(e) = Channel::send_on(&self.transport, &reply).await {
                tracing::warn!(error = %e, "failed to send not-found error");
            }
            return;
        };
        let transport = self.transport.clone();
        tokio::spawn(async move {
            // A panicking handler must still produce an error envelope or the
            // remote caller hangs on this id forever.
            let outcome = AssertUnwindSafe(handler(args)).catch_unwind().await;
            let reply = match outcome {
                Ok(Ok(value)) => Envelope::Return { id, ret: value },
                Ok(Err(failure)) => Envelope::Error {
                    id,
                    error: failure.into_value(),
                },
                Err(panic) => {
                    let message = if let Some(s) = panic.downcast_ref::<&str>() {
                        format!("handler panicked: {s}")
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        format!("handler panicked: {s}")
                    } else {
                        "handler panicked".to_owned()
                    };
                    tracing::error!(name = %name, panic = %message, "handler panicked");
                    Envelope::Error {
                        id,
                        error: json!({"kind": "handler_panic", "message": message}),
                    }
                }
            };
            if let Err(e) = Channel::send_on(&transport, &reply).await {
                tracing::warn!(error = %e, "failed to send call response");
            }
        });
    }

    async fn handle_command(&mut self, command: Command) -> Option<CloseReason> {
        match command {
            Command::Call { name, args, reply } => {
                self.send_call(name, args, reply).await;
                None
            }
            Command::Close => {
                self.phase = Phase::Closed;
                if let Err(e) = Channel::send_on(&self.transport, &Envelope::Close).await {
                    tracing::debug!(error = %e, "failed to announce close");
                }
                let drained = self.pending.drain_all(|| CallError::GracefulClose);
                if drained > 0 {
                    tracing::debug!(drained, "drained pending calls on local close");
                }
                self.transport.close().await;
                Some(CloseReason::LocalClose)
            }
        }
    }

    async fn send_call(
        &mut self,
        name: String,
        args: Vec<Value>,
        reply: oneshot::Sender<Result<Value, CallError>>,
    ) {
        if self.phase != Phase::Open {
            let _ = reply.send(Err(CallError::Transport(TransportError::NotOpen)));
            return;
        }
        let id = self.ids.next_id();
        tracing::debug!(id = %id, name = %name, argc = args.len(), "outbound call");
        // Register before sending so a fast response cannot race the waiter.
        if let Err(failure) = self.pending.register(id.clone(), reply) {
            let error = match failure.error {
                PendingError::Capacity { max } => CallError::TooManyPending { max },
                other => {
                    // Unreachable with a monotonic generator.
                    tracing::error!(error = %other, "call id invariant violated");
                    CallError::ConnectionClosed
                }
            };
            let _ = failure.sender.send(Err(error));
            return;
        }
        let envelope = Envelope::Call { id: id.clone(), name, args };
        if let Err(e) = Channel::send_on(&self.transport, &envelope).await {
            // The waiter was registered above; pull it back out so the caller
            // sees the send failure immediately.
            tracing::warn!(id = %id, error = %e, "failed to send call");
            let _ = self.pending.reject(id, CallError::Transport(e));
        }
    }
}

fn function_not_found(name: &str) -> Value {
    json!({
        "kind": "function_not_found",
        "message": format!("no function registered under name {name:?}"),
    })
}

//! Channel adapter: envelopes over a transport.
//!
//! The adapter owns serialization and the open/message/closed event ordering.
//! Malformed inbound frames are logged and dropped; they never reach the peer
//! and never end the session.

use crate::{Envelope, Transport, TransportError};

/// What the channel reports to its consumer, in order: `Open` exactly once,
/// then any number of `Message`s, then `Closed` exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel is ready for traffic.
    Open,
    /// One decoded inbound envelope.
    Message(Envelope),
    /// Terminal. `was_clean` is false when the transport died without a clean
    /// shutdown.
    Closed {
        /// Whether the transport shut down cleanly.
        was_clean: bool,
    },
}

/// Envelope codec bound to one transport.
#[derive(Debug)]
pub struct Channel {
    transport: Transport,
    opened: bool,
    terminal: Option<bool>,
}

impl Channel {
    /// Bind to a transport.
    pub fn new(transport: Transport) -> Channel {
        Channel {
            transport,
            opened: false,
            terminal: None,
        }
    }

    /// A handle to the underlying transport, for sending from other tasks.
    pub fn transport(&self) -> Transport {
        self.transport.clone()
    }

    /// Encode and send one envelope.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        Channel::send_on(&self.transport, envelope).await
    }

    /// [`send`](Channel::send) without the channel itself, for spawned
    /// handler tasks that only hold a transport clone.
    pub async fn send_on(transport: &Transport, envelope: &Envelope) -> Result<(), TransportError> {
        if transport.is_closed() {
            return Err(TransportError::Closed);
        }
        let text = envelope.encode().map_err(TransportError::Encode)?;
        transport.send_text(text).await
    }

    /// Next channel event. After the terminal event this keeps returning the
    /// same `Closed`.
    pub async fn recv_event(&mut self) -> ChannelEvent {
        if let Some(was_clean) = self.terminal {
            return ChannelEvent::Closed { was_clean };
        }
        if !self.opened {
            self.opened = true;
            return ChannelEvent::Open;
        }
        loop {
            match self.transport.recv_text().await {
                Ok(text) => match Envelope::decode(&text) {
                    Ok(envelope) => return ChannelEvent::Message(envelope),
                    Err(e) => {
                        tracing::warn!(error = %e, len = text.len(), "dropping malformed frame");
                    }
                },
                Err(TransportError::Closed) => {
                    self.terminal = Some(true);
                    return ChannelEvent::Closed { was_clean: true };
                }
                Err(TransportError::Disconnected) => {
                    self.terminal = Some(false);
                    return ChannelEvent::Closed { was_clean: false };
                }
                Err(e) => {
                    tracing::error!(error = %e, "transport failed");
                    self.terminal = Some(false);
                    return ChannelEvent::Closed { was_clean: false };
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg(feature = "mem")]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn open_is_reported_before_any_message() {
        let (local, remote) = Transport::mem_pair();
        remote.send_text(r#"{"type":"close"}"#.into()).await.unwrap();
        let mut channel = Channel::new(local);
        assert_eq!(channel.recv_event().await, ChannelEvent::Open);
        assert_eq!(
            channel.recv_event().await,
            ChannelEvent::Message(Envelope::Close)
        );
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_not_fatal() {
        let (local, remote) = Transport::mem_pair();
        remote.send_text("{ not json".into()).await.unwrap();
        remote.send_text(r#"{"type":"warp"}"#.into()).await.unwrap();
        remote
            .send_text(r#"{"type":"return","id":"1","ret":7}"#.into())
            .await
            .unwrap();
        let mut channel = Channel::new(local);
        assert_eq!(channel.recv_event().await, ChannelEvent::Open);
        assert_eq!(
            channel.recv_event().await,
            ChannelEvent::Message(Envelope::Return {
                id: "1".into(),
                ret: json!(7)
            })
        );
    }

    #[tokio::test]
    async fn dropped_remote_is_an_unclean_close() {
        let (local, remote) = Transport::mem_pair();
        drop(remote);
        let mut channel = Channel::new(local);
        assert_eq!(channel.recv_event().await, ChannelEvent::Open);
        assert_eq!(
            channel.recv_event().await,
            ChannelEvent::Closed { was_clean: false }
        );
        // Terminal events repeat instead of hanging.
        assert_eq!(
            channel.recv_event().await,
            ChannelEvent::Closed { was_clean: false }
        );
    }

    #[tokio::test]
    async fn send_rejects_after_close() {
        let (local, _remote) = Transport::mem_pair();
        let channel = Channel::new(local);
        channel.transport().close().await;
        assert!(matches!(
            channel.send(&Envelope::Close).await,
            Err(TransportError::Closed)
        ));
    }
}

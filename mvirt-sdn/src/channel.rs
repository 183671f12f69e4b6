//! Outgoing side of a switch connection.
//!
//! The core never encodes or writes bytes itself. It hands typed messages to
//! a [`ControlChannel`]; what happens after that (encoding, socket writes) is
//! the transport's business. Sends are fire-and-forget and never retried.

use crate::message::OutgoingMessage;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors returned by a control channel send.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Control channel closed")]
    Closed,

    #[error("Write failed: {0}")]
    Write(String),
}

/// Outgoing message sink for one switch connection.
pub trait ControlChannel: Send + Sync {
    /// Queue a message for the switch. Must not block on acknowledgement.
    fn send(&self, msg: OutgoingMessage) -> Result<(), TransportError>;
}

/// Channel handing outgoing messages to a transport task over an unbounded
/// tokio queue.
#[derive(Clone)]
pub struct QueueChannel {
    tx: mpsc::UnboundedSender<OutgoingMessage>,
}

impl QueueChannel {
    /// Create a channel and the receiver the transport drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutgoingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ControlChannel for QueueChannel {
    fn send(&self, msg: OutgoingMessage) -> Result<(), TransportError> {
        self.tx.send(msg).map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_channel_delivers_in_order() {
        let (channel, mut rx) = QueueChannel::new();
        channel.send(OutgoingMessage::Hello).unwrap();
        channel.send(OutgoingMessage::FeaturesRequest).unwrap();

        assert_eq!(rx.try_recv().unwrap(), OutgoingMessage::Hello);
        assert_eq!(rx.try_recv().unwrap(), OutgoingMessage::FeaturesRequest);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_queue_channel_closed() {
        let (channel, rx) = QueueChannel::new();
        drop(rx);
        assert!(matches!(
            channel.send(OutgoingMessage::Hello),
            Err(TransportError::Closed)
        ));
    }
}

//! Outbound message broadcasting.
//!
//! Per §5, broadcasts are non-blocking: handlers place outbound messages on an
//! unbounded queue and return immediately, while a dedicated (external) broadcaster
//! task drains the channel and hands messages to the p2p layer. This module only owns
//! the sender half and the message shape; wiring the receiver to a transport is the
//! embedding node's job.

use crate::types::{SyncInfo, Timeout, Vote};
use tokio::sync::mpsc;

/// Tagged sum of every message the engine may emit. Downstream consumers dispatch on
/// the variant rather than subscribing to three separate channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Vote(Vote),
    Timeout(Timeout),
    SyncInfo(SyncInfo),
}

/// Non-blocking outbound queue. Cloning shares the same underlying channel.
#[derive(Clone)]
pub struct Broadcaster {
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl Broadcaster {
    /// Create a new channel, returning the sender half (held by the engine) and the
    /// receiver half (handed to the embedding node's p2p layer).
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Enqueue a message. Only fails if every receiver has been dropped, which this
    /// engine treats as "nobody is listening" rather than an error worth propagating.
    pub fn send(&self, message: OutboundMessage) {
        let _ = self.sender.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockInfo, Timeout};
    use alloy_primitives::B256;

    #[tokio::test]
    async fn send_is_non_blocking_and_deliverable() {
        let (broadcaster, mut receiver) = Broadcaster::channel();
        let timeout = Timeout::new(1, vec![1, 2, 3], 450);
        broadcaster.send(OutboundMessage::Timeout(timeout.clone()));
        let received = receiver.recv().await.unwrap();
        assert_eq!(received, OutboundMessage::Timeout(timeout));
    }

    #[tokio::test]
    async fn dropping_receiver_does_not_panic_on_send() {
        let (broadcaster, receiver) = Broadcaster::channel();
        drop(receiver);
        let block_info = BlockInfo::new(B256::ZERO, 1, 1);
        let vote = crate::types::Vote::new(block_info, vec![0u8; 65], 0);
        broadcaster.send(OutboundMessage::Vote(vote));
    }
}

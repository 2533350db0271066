//! Gossip publisher adapters.

use crate::domain::PoolL2Tx;
use crate::ports::outbound::{GossipPublisher, PublishError};
use tokio::sync::mpsc;

/// No-op publisher for running without a gossip layer.
#[derive(Debug, Clone, Default)]
pub struct NoOpPublisher;

impl GossipPublisher for NoOpPublisher {
    fn publish(&self, _tx: &PoolL2Tx) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Publishes onto an in-process channel.
///
/// The receiving end can feed another pool's gossip ingest task.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<PoolL2Tx>,
}

impl ChannelPublisher {
    pub fn new(sender: mpsc::UnboundedSender<PoolL2Tx>) -> Self {
        Self { sender }
    }

    /// Publisher plus the receiver it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PoolL2Tx>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl GossipPublisher for ChannelPublisher {
    fn publish(&self, tx: &PoolL2Tx) -> Result<(), PublishError> {
        self.sender
            .send(tx.clone())
            .map_err(|_| PublishError::NotConnected)
    }
}

use async_trait::async_trait;

use crate::{ack::Acknowledgment, batch::BatchPayload, item::Recipient};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Delivers one finalized batch downstream.
    ///
    /// Called at most once per epoch. An `Err` is logged by the aggregator
    /// and the batch is dropped.
    async fn send(&self, payload: &BatchPayload) -> Result<Acknowledgment, BoxError>;
}

#[async_trait]
pub trait StatusNotifier: Send + Sync {
    /// Best-effort delivery of a batch summary to one recipient.
    async fn notify(&self, recipient: &Recipient, text: &str) -> Result<(), BoxError>;
}

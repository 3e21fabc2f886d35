use async_trait::async_trait;
use batch_aggregator::{
    sink::{BoxError, StatusNotifier},
    Recipient,
};

/// Used when no notification credential is configured.
pub struct LogNotifier;

#[async_trait]
impl StatusNotifier for LogNotifier {
    async fn notify(&self, recipient: &Recipient, text: &str) -> Result<(), BoxError> {
        tracing::info!(%recipient, "Status: {}", text.replace('\n', ", "));
        Ok(())
    }
}

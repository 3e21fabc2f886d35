use std::time::Duration;

use async_trait::async_trait;
use batch_aggregator::{
    sink::{BatchSink, BoxError},
    Acknowledgment, BatchPayload,
};
use relay_common::{telemetry::generate_http_client, ClientWithMiddleware};

const ERROR_BODY_PREVIEW: usize = 200;

/// Posts finalized batches as JSON to a single HTTP endpoint.
pub struct HttpBatchSink {
    client: ClientWithMiddleware,
    url: String,
}

impl HttpBatchSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: generate_http_client(timeout, true)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl BatchSink for HttpBatchSink {
    #[tracing::instrument(skip(self, payload), fields(batch_id = %payload.batch_id), name = "sink-send-http")]
    async fn send(&self, payload: &BatchPayload) -> Result<Acknowledgment, BoxError> {
        let body = serde_json::to_vec(payload)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let preview = String::from_utf8_lossy(&body[..body.len().min(ERROR_BODY_PREVIEW)]);
            return Err(format!("sink responded with {}: {}", status, preview).into());
        }

        Ok(Acknowledgment::from_slice(&body))
    }
}

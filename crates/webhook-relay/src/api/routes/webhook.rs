use std::sync::Arc;

use axum::{http::StatusCode, Extension, Json};
use batch_aggregator::Aggregator;
use serde::Serialize;
use tracing::debug;

use crate::{
    api::IngressOptions,
    metrics::IngressMetrics,
    normalize::{normalize, Normalized, Update},
};

#[derive(Debug, Serialize)]
pub(crate) struct WebhookResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

/// Accepts one Telegram update. The item is buffered before the response is
/// sent, so it is covered by graceful shutdown and keeps its arrival order.
/// The call blocks while a size-triggered flush is running.
#[tracing::instrument(skip_all)]
pub(crate) async fn handle_webhook<M: IngressMetrics>(
    Extension(aggregator): Extension<Arc<Aggregator>>,
    Extension(options): Extension<Arc<IngressOptions>>,
    Extension(metrics): Extension<M>,
    Json(update): Json<Update>,
) -> (StatusCode, Json<WebhookResponse>) {
    match normalize(update, options.forwarded_only) {
        Normalized::Ignored(reason) => {
            debug!("Ignoring update: {}", reason);
            metrics.inc_updates_ignored();
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    status: "ignored",
                    id: None,
                    reason: Some(reason),
                }),
            )
        }
        Normalized::Accepted(item) => {
            let id = item.id.clone();
            metrics.inc_updates_accepted();
            aggregator.add(item).await;
            (
                StatusCode::ACCEPTED,
                Json(WebhookResponse {
                    status: "accepted",
                    id: Some(id),
                    reason: None,
                }),
            )
        }
    }
}

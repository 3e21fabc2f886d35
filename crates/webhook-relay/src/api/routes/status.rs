use std::sync::Arc;

use axum::{Extension, Json};
use batch_aggregator::Aggregator;
use serde::Serialize;

use crate::api::IngressOptions;

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    status: &'static str,
    pending: usize,
    max_size: usize,
    max_wait_secs: u64,
    notifications_enabled: bool,
    version: &'static str,
}

#[tracing::instrument(skip_all)]
pub(crate) async fn handle_status(
    Extension(aggregator): Extension<Arc<Aggregator>>,
    Extension(options): Extension<Arc<IngressOptions>>,
) -> Json<StatusResponse> {
    let config = aggregator.config();

    Json(StatusResponse {
        status: "running",
        pending: aggregator.pending(),
        max_size: config.max_size,
        max_wait_secs: config.max_wait.as_secs(),
        notifications_enabled: options.notifications_enabled,
        version: env!("CARGO_PKG_VERSION"),
    })
}

mod routes;

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use batch_aggregator::Aggregator;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::IngressMetrics;

use self::routes::{status::handle_status, webhook::handle_webhook};

#[derive(Debug, Clone)]
pub struct IngressOptions {
    pub forwarded_only: bool,
    pub notifications_enabled: bool,
}

pub fn router<M: IngressMetrics>(
    aggregator: Arc<Aggregator>,
    options: IngressOptions,
    metrics: M,
) -> Router {
    Router::new()
        .route("/", get(handle_status))
        .route("/healthcheck", get(health_handler))
        .route("/webhook", post(handle_webhook::<M>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(aggregator))
                .layer(Extension(Arc::new(options)))
                .layer(Extension(metrics)),
        )
}

/// Serves the ingress until `shutdown` resolves.
pub async fn init<T, M, F>(
    addr: T,
    aggregator: Arc<Aggregator>,
    options: IngressOptions,
    metrics: M,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    T: Into<SocketAddr>,
    M: IngressMetrics,
    F: Future<Output = ()>,
{
    let addr = addr.into();
    let app = router(aggregator, options, metrics);

    info!("Listening on {}", addr);
    axum::Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[tracing::instrument()]
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "Ok")
}

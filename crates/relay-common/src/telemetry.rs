use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace::Config, Resource};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::{DefaultSpanBackend, SpanBackendWithUrl, TracingMiddleware};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Installs the global tracing subscriber.
///
/// Spans are additionally exported via OTLP when `OTLP_ENDPOINT` is set.
pub fn setup_telemetry(service_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    if let Ok(otlp_endpoint) = std::env::var("OTLP_ENDPOINT") {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(otlp_endpoint),
            )
            .with_trace_config(Config::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", service_name.to_string()),
                KeyValue::new(
                    "deployment.environment",
                    std::env::var("ENV").unwrap_or("development".into()),
                ),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;

        Registry::default()
            .with(EnvFilter::from_default_env())
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;

        info!("Setup tracing with OTLP");
    } else {
        Registry::default()
            .with(EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;

        info!("Setup tracing without OTLP");
    }

    Ok(())
}

pub fn teardown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Builds an HTTP client whose requests are traced and abort after `timeout`.
///
/// Set `record_url` to false for endpoints that carry credentials in the path.
pub fn generate_http_client(
    timeout: Duration,
    record_url: bool,
) -> Result<ClientWithMiddleware, reqwest::Error> {
    let reqwest_client = reqwest::Client::builder().timeout(timeout).build()?;
    let builder = ClientBuilder::new(reqwest_client);

    let builder = if record_url {
        builder.with(TracingMiddleware::<SpanBackendWithUrl>::new())
    } else {
        builder.with(TracingMiddleware::<DefaultSpanBackend>::new())
    };

    Ok(builder.build())
}

mod api;
mod config;
mod metrics;
mod normalize;
mod notifiers;
mod sinks;

extern crate dotenv;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use batch_aggregator::{sink::StatusNotifier, Aggregator};
use relay_common::telemetry::{setup_telemetry, teardown_telemetry};
use tokio::sync::oneshot::{Receiver, Sender};
use tracing::{error, info, warn};

use crate::{
    api::IngressOptions,
    config::Configuration,
    metrics::setup_metrics,
    notifiers::{LogNotifier, TelegramNotifier},
    sinks::http::HttpBatchSink,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    setup_telemetry("webhook-relay")?;

    let config = Configuration::from_env()?;
    info!("Chosen configuration: {:#?}", config);

    let metrics = setup_metrics(config.metrics_port)?;
    let sink = Arc::new(HttpBatchSink::new(&config.sink_url, config.sink_timeout)?);
    let notifier = setup_notifier(&config).await?;
    let aggregator = Aggregator::with_metrics(
        config.batch.clone(),
        sink,
        notifier,
        Arc::new(metrics.clone()),
    );

    let options = IngressOptions {
        forwarded_only: config.forwarded_only,
        notifications_enabled: config.telegram.is_some(),
    };

    let signal_flag = setup_signal_handlers()?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    setup_shutdown_handler(signal_flag, shutdown_tx);

    api::init(
        ([0, 0, 0, 0], config.port),
        aggregator.clone(),
        options,
        metrics,
        wait_for_shutdown(shutdown_rx),
    )
    .await?;

    info!("Flushing pending batch");
    match aggregator.flush().await {
        Some(report) if report.outcome.is_ok() => {
            info!("Flushed {} ({} items)", report.batch_id, report.expected_count)
        }
        Some(report) => error!(
            "Final flush of {} failed, {} items dropped",
            report.batch_id, report.expected_count
        ),
        None => info!("Nothing to flush"),
    }

    teardown_telemetry();

    Ok(())
}

async fn setup_notifier(
    config: &Configuration,
) -> Result<Arc<dyn StatusNotifier>, Box<dyn std::error::Error>> {
    match &config.telegram {
        Some(telegram) => {
            info!("Status notifications go to Telegram");
            let notifier = TelegramNotifier::new(telegram, config.batch.notify_timeout)?;

            if let Some(webhook_url) = &telegram.webhook_url {
                match notifier.set_webhook(webhook_url).await {
                    Ok(()) => info!("Webhook set to {}", webhook_url),
                    Err(e) => error!("Setting webhook to {} failed: {}", webhook_url, e),
                }
            }

            Ok(Arc::new(notifier))
        }
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set, status notifications are only logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

async fn wait_for_shutdown(shutdown_rx: Receiver<()>) {
    let _ = shutdown_rx.await;
}

fn setup_shutdown_handler(signal_flag: Arc<AtomicBool>, shutdown_tx: Sender<()>) {
    std::thread::spawn(move || loop {
        if !signal_flag.load(Ordering::Relaxed) {
            std::thread::sleep(std::time::Duration::from_secs(1));
            continue;
        }

        info!("Shutting down gracefully");
        if shutdown_tx.send(()).is_err() {
            error!("Signaling graceful shutdown failed");
        }
        break;
    });
}

fn setup_signal_handlers() -> Result<Arc<AtomicBool>, Box<dyn std::error::Error>> {
    let signal_flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, signal_flag.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, signal_flag.clone())?;
    Ok(signal_flag)
}

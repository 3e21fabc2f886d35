use batch_aggregator::{metrics::AggregatorMetrics, Trigger};
use prometheus_exporter::prometheus::{
    core::{AtomicU64, GenericCounter},
    IntCounterVec,
};

/// Counters for the HTTP ingress, implemented by a fake in route tests.
pub trait IngressMetrics: Clone + Send + Sync + 'static {
    fn inc_updates_accepted(&self);
    fn inc_updates_ignored(&self);
}

#[derive(Clone, Debug)]
pub struct RelayMetrics {
    updates_accepted: GenericCounter<AtomicU64>,
    updates_ignored: GenericCounter<AtomicU64>,
    items_added: GenericCounter<AtomicU64>,
    batches_finalized: IntCounterVec,
    batch_items: GenericCounter<AtomicU64>,
    finalize_failures: GenericCounter<AtomicU64>,
    notifications_sent: GenericCounter<AtomicU64>,
    notifications_failed: GenericCounter<AtomicU64>,
}

impl RelayMetrics {
    fn register() -> Result<Self, prometheus_exporter::prometheus::Error> {
        Ok(Self {
            updates_accepted: prometheus_exporter::prometheus::register_int_counter!(
                "updates_accepted",
                "Inbound updates handed to the aggregator"
            )?,
            updates_ignored: prometheus_exporter::prometheus::register_int_counter!(
                "updates_ignored",
                "Inbound updates without a usable message"
            )?,
            items_added: prometheus_exporter::prometheus::register_int_counter!(
                "items_added",
                "Items buffered by the aggregator"
            )?,
            batches_finalized: prometheus_exporter::prometheus::register_int_counter_vec!(
                "batches_finalized",
                "Finalized batches by trigger",
                &["trigger"]
            )?,
            batch_items: prometheus_exporter::prometheus::register_int_counter!(
                "batch_items",
                "Items contained in finalized batches"
            )?,
            finalize_failures: prometheus_exporter::prometheus::register_int_counter!(
                "finalize_failures",
                "Batches the downstream sink did not accept"
            )?,
            notifications_sent: prometheus_exporter::prometheus::register_int_counter!(
                "notifications_sent",
                "Status notifications delivered"
            )?,
            notifications_failed: prometheus_exporter::prometheus::register_int_counter!(
                "notifications_failed",
                "Status notifications that failed or timed out"
            )?,
        })
    }
}

impl IngressMetrics for RelayMetrics {
    fn inc_updates_accepted(&self) {
        self.updates_accepted.inc()
    }

    fn inc_updates_ignored(&self) {
        self.updates_ignored.inc()
    }
}

impl AggregatorMetrics for RelayMetrics {
    fn inc_items_added(&self) {
        self.items_added.inc()
    }

    fn inc_batches_finalized(&self, trigger: Trigger, size: usize) {
        self.batches_finalized
            .with_label_values(&[trigger.as_str()])
            .inc();
        self.batch_items.inc_by(size as u64);
    }

    fn inc_finalize_failures(&self) {
        self.finalize_failures.inc()
    }

    fn inc_notifications(&self, succeeded: usize, failed: usize) {
        self.notifications_sent.inc_by(succeeded as u64);
        self.notifications_failed.inc_by(failed as u64);
    }
}

pub fn setup_metrics(port: u16) -> Result<RelayMetrics, Box<dyn std::error::Error>> {
    let binding = format!("0.0.0.0:{}", port).parse()?;
    prometheus_exporter::start(binding)?;

    Ok(RelayMetrics::register()?)
}

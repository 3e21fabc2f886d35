use crate::batch::Trigger;

/// Hooks for exporting aggregator counters.
///
/// All methods default to doing nothing.
pub trait AggregatorMetrics: Send + Sync {
    fn inc_items_added(&self) {}
    fn inc_batches_finalized(&self, _trigger: Trigger, _size: usize) {}
    fn inc_finalize_failures(&self) {}
    fn inc_notifications(&self, _succeeded: usize, _failed: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl AggregatorMetrics for NoopMetrics {}

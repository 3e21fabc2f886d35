//! Size- and time-bounded batching of inbound items with exactly-once
//! finalization per batch epoch.

mod ack;
mod aggregator;
mod batch;
mod item;
pub mod metrics;
pub mod sink;

pub use ack::{Acknowledgment, StatusSummary};
pub use aggregator::{Aggregator, AggregatorConfig, FlushReport};
pub use batch::{BatchId, BatchPayload, Trigger, BATCH_MODE};
pub use item::{Item, Recipient};

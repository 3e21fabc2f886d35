use std::{
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Serialize;

use crate::item::Item;

pub const BATCH_MODE: &str = "batch_ingest";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
/// Identifies a single batch epoch.
///
/// Combines the wall clock at epoch start with a process-wide sequence
/// number, so two epochs opened within the same millisecond still differ.
pub struct BatchId {
    inner: String,
}

impl BatchId {
    pub fn generate() -> Self {
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        Self {
            inner: format!("batch_{millis}_{sequence}"),
        }
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        self.inner.as_str()
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What caused an epoch to be finalized.
pub enum Trigger {
    Size,
    Timer,
    Shutdown,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Size => "size",
            Trigger::Timer => "timer",
            Trigger::Shutdown => "shutdown",
        }
    }
}

impl Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// The body sent to the downstream sink for one finalized epoch.
pub struct BatchPayload {
    pub mode: &'static str,
    pub batch_id: BatchId,
    pub messages: Vec<Item>,
    pub transmission_complete: bool,
    pub expected_count: usize,
}

impl BatchPayload {
    pub fn new(batch_id: BatchId, messages: Vec<Item>) -> Self {
        Self {
            mode: BATCH_MODE,
            batch_id,
            expected_count: messages.len(),
            messages,
            transmission_complete: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::{BatchId, BatchPayload};
    use crate::item::Item;

    #[test]
    fn test_batch_ids_are_unique() {
        let ids = (0..1000).map(|_| BatchId::generate()).collect::<HashSet<_>>();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.as_ref().starts_with("batch_")));
    }

    #[test]
    fn test_payload_wire_shape() {
        let batch_id = BatchId::generate();
        let payload = BatchPayload::new(
            batch_id.clone(),
            vec![Item::new("a").with_field("content", "x"), Item::new("b")],
        );

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "mode": "batch_ingest",
                "batch_id": batch_id.as_ref(),
                "messages": [{ "id": "a", "content": "x" }, { "id": "b" }],
                "transmission_complete": true,
                "expected_count": 2,
            })
        );
    }
}

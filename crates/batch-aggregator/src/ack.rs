use std::fmt::Display;

use serde::Serialize;
use serde_json::Value;

use crate::batch::BatchId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// The downstream sink's response to a finalized batch.
///
/// Every field is optional. A missing or mistyped field is read as unknown.
pub struct Acknowledgment {
    pub status: Option<String>,
    pub ack: Option<String>,
    pub processed_messages: Option<u64>,
    pub rollback: Option<bool>,
}

impl Acknowledgment {
    /// Never fails: a body that is not a JSON object yields an empty acknowledgment.
    pub fn from_slice(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                tracing::debug!("Acknowledgment body is not JSON: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let text = |key: &str| match object.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let processed_messages = match object.get("processed_messages") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        Self {
            status: text("status"),
            ack: text("ack"),
            processed_messages,
            rollback: object.get("rollback").and_then(Value::as_bool),
        }
    }
}

/// Human readable outcome of one batch, sent to every recipient of the epoch.
pub struct StatusSummary<'a> {
    pub batch_id: &'a BatchId,
    pub outcome: Result<&'a Acknowledgment, &'a str>,
}

fn or_unknown<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown".into())
}

impl Display for StatusSummary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.outcome {
            Ok(ack) => write!(
                f,
                "Batch {} processed\nstatus: {}\nack: {}\nprocessed messages: {}\nrollback: {}",
                self.batch_id,
                or_unknown(&ack.status),
                or_unknown(&ack.ack),
                or_unknown(&ack.processed_messages),
                or_unknown(&ack.rollback),
            ),
            Err(error) => write!(
                f,
                "Batch {} failed\nstatus: error\nack: unknown\nprocessed messages: unknown\nrollback: unknown\nerror: {}",
                self.batch_id, error
            ),
        }
    }
}

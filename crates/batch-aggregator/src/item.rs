use std::fmt::Display;

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
/// Opaque routing handle for post-flush status notifications,
/// e.g. the chat an event originated from.
pub struct Recipient {
    inner: String,
}

impl Recipient {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            inner: recipient.into(),
        }
    }
}

impl AsRef<str> for Recipient {
    fn as_ref(&self) -> &str {
        self.inner.as_str()
    }
}

impl Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

const ID_KEY: &str = "id";

#[derive(Debug, Clone, PartialEq, Serialize)]
/// One accumulated event.
///
/// The aggregator never looks at `fields`; they are passed through to the
/// downstream sink next to `id`. The recipient is only used for routing
/// status notifications and is not part of the serialized payload.
pub struct Item {
    pub id: String,
    #[serde(skip)]
    pub recipient: Option<Recipient>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            recipient: None,
            fields: Map::new(),
        }
    }

    pub fn with_recipient(mut self, recipient: Recipient) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Adds a passthrough field. The `id` key is reserved for [`Item::id`]
    /// and is skipped so the serialized item never carries it twice.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key == ID_KEY {
            tracing::warn!("Ignoring passthrough field {:?} on item {}", key, self.id);
            return self;
        }

        self.fields.insert(key, value.into());
        self
    }
}

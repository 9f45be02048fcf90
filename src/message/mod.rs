//! Message model
//!
//! `Message` is the unit of work exchanged between the publisher and the
//! listeners. It is built once by the publisher and never mutated: fields are
//! private and only readable through accessors.
//!
//! The JSON field names follow the wire shape shared with the other
//! producers and consumers on the topic:
//! - `id`: UUID v4, also used as the partition key
//! - `conteudo`: message content
//! - `remetente`: sender
//! - `dataHora`: local date-time of creation (ISO-8601 or numeric array)
//! - `prioridade`: opaque priority label, `NORMAL` when absent
//!
//! Decoding also accepts the English aliases (`content`, `sender`,
//! `timestamp`, `priority`).

pub mod codec;
pub mod payload;

pub use codec::DateFormat;
pub use payload::{DecodeError, Payload};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Priority assigned when the caller gives none (or a blank one).
pub const DEFAULT_PRIORITY: &str = "NORMAL";

pub(crate) const FIELD_ID: &str = "id";
pub(crate) const FIELD_CONTENT: &str = "conteudo";
pub(crate) const FIELD_SENDER: &str = "remetente";
pub(crate) const FIELD_TIMESTAMP: &str = "dataHora";
pub(crate) const FIELD_PRIORITY: &str = "prioridade";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    #[serde(rename = "conteudo", alias = "content")]
    content: String,
    #[serde(rename = "remetente", alias = "sender")]
    sender: String,
    #[serde(rename = "dataHora", alias = "timestamp")]
    timestamp: NaiveDateTime,
    #[serde(
        rename = "prioridade",
        alias = "priority",
        default = "default_priority",
        deserialize_with = "deserialize_priority"
    )]
    priority: String,
}

impl Message {
    /// Build a new message with a fresh id and the current local time.
    pub fn new(content: impl Into<String>, sender: impl Into<String>, priority: Option<&str>) -> Self {
        Self::from_parts(
            Uuid::new_v4().to_string(),
            content,
            sender,
            Local::now().naive_local(),
            priority,
        )
    }

    /// Rebuild a message from already-known parts, e.g. after decoding.
    pub fn from_parts(
        id: impl Into<String>,
        content: impl Into<String>,
        sender: impl Into<String>,
        timestamp: NaiveDateTime,
        priority: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            sender: sender.into(),
            timestamp,
            priority: normalize_priority(priority),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn priority(&self) -> &str {
        &self.priority
    }
}

/// Blank or missing priorities collapse to [`DEFAULT_PRIORITY`].
pub fn normalize_priority(priority: Option<&str>) -> String {
    match priority {
        Some(p) if !p.trim().is_empty() => p.to_string(),
        _ => DEFAULT_PRIORITY.to_string(),
    }
}

fn default_priority() -> String {
    DEFAULT_PRIORITY.to_string()
}

fn deserialize_priority<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let priority = Option::<String>::deserialize(deserializer)?;
    Ok(normalize_priority(priority.as_deref()))
}

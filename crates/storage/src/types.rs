use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::ids::SessionId;

/// Schema holding the message table on the remote store.
pub const DEFAULT_SCHEMA: &str = "public";
/// Name of the single message table.
pub const DEFAULT_TABLE: &str = "messages";

/// Author of one message. Wire values are `"human"` and `"ai"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Human,
    Ai,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
        }
    }
}

/// The `message` column: content plus author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl MessagePayload {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind,
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Ai, content)
    }
}

/// One stored row, as returned by reads and carried by insert events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    pub session_id: SessionId,
    #[serde(deserialize_with = "deserialize_payload")]
    pub message: MessagePayload,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMessageRow {
    pub session_id: SessionId,
    pub message: MessagePayload,
}

impl NewMessageRow {
    pub fn new(session_id: SessionId, message: MessagePayload) -> Self {
        Self {
            session_id,
            message,
        }
    }
}

/// A row observed through a realtime subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertEvent {
    pub row: MessageRow,
}

// `jsonb` columns arrive as objects, `json`-as-text columns as an encoded string.
fn deserialize_payload<'de, D>(deserializer: D) -> Result<MessagePayload, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPayload {
        Object(MessagePayload),
        Encoded(String),
    }

    match RawPayload::deserialize(deserializer)? {
        RawPayload::Object(payload) => Ok(payload),
        RawPayload::Encoded(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
    }
}

// `timestamptz` serializes with an offset; plain `timestamp` does not and is taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("unrecognized timestamp '{raw}'"))
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Postgres text output uses a space separator and a short `+00` offset.
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

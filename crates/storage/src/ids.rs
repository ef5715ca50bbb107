use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::ensure;
use uuid::Uuid;

use super::error::{InvalidSessionIdSnafu, StorageError, StorageResult};

/// Groups the rows of one conversation thread.
///
/// New sessions are minted as v4 UUIDs, but ids read back from the table are kept
/// verbatim: the remote column is plain text and older rows may not be UUIDs.
///
/// Deserialization goes through [`SessionId::parse`], so rows from every backend obey
/// the same non-blank rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> StorageResult<Self> {
        let trimmed = raw.trim();
        ensure!(
            !trimmed.is_empty(),
            InvalidSessionIdSnafu {
                stage: "parse-session-id",
                raw: raw.to_string(),
            }
        );
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.0).ok()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = StorageError;

    fn try_from(raw: String) -> StorageResult<Self> {
        Self::parse(&raw)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_uuid_text() {
        let first = SessionId::new_v4();
        let second = SessionId::new_v4();

        assert!(first.as_uuid().is_some());
        assert_eq!(first.as_str().len(), 36);
        assert_ne!(first, second);
    }

    #[test]
    fn parse_keeps_non_uuid_ids_but_rejects_blank_ones() {
        let legacy = SessionId::parse(" abc ").expect("non-empty id parses");
        assert_eq!(legacy.as_str(), "abc");
        assert!(legacy.as_uuid().is_none());

        assert!(matches!(
            SessionId::parse("   "),
            Err(StorageError::InvalidSessionId { .. })
        ));
    }

    #[test]
    fn deserialization_applies_the_parse_rules() {
        let parsed: SessionId = serde_json::from_str("\" abc \"").expect("non-blank id decodes");
        assert_eq!(parsed.as_str(), "abc");
        assert_eq!(serde_json::to_string(&parsed).expect("encodes"), "\"abc\"");

        assert!(serde_json::from_str::<SessionId>("\"  \"").is_err());
    }
}

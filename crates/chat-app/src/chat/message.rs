use std::collections::HashSet;

use tern_storage::{MessageKind, MessagePayload, MessageRow, SessionId};

/// Longest title shown in the sidebar, counted in characters.
pub const TITLE_MAX_CHARS: usize = 100;
/// Marker appended to titles that were cut.
pub const TITLE_ELLIPSIS: &str = "...";

/// One entry of the visible thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: String,
    pub kind: MessageKind,
}

impl Message {
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

impl From<MessagePayload> for Message {
    fn from(payload: MessagePayload) -> Self {
        Self::new(payload.kind, payload.content)
    }
}

impl From<&MessageRow> for Message {
    fn from(row: &MessageRow) -> Self {
        Self::new(row.message.kind, row.message.content.clone())
    }
}

/// Sidebar summary of one session. Derived on every fetch, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub session_id: SessionId,
    pub title: String,
}

impl Conversation {
    pub fn new(session_id: SessionId, title: impl Into<String>) -> Self {
        Self {
            session_id,
            title: title.into(),
        }
    }
}

pub fn conversation_title(first_human_content: &str) -> String {
    let mut characters = first_human_content.chars();
    let title = characters.by_ref().take(TITLE_MAX_CHARS).collect::<String>();
    if characters.next().is_some() {
        format!("{title}{TITLE_ELLIPSIS}")
    } else {
        title
    }
}

/// Folds an ascending row listing into one conversation per session.
///
/// The first human row of each session names it; sessions without any human row are
/// left out. Output order follows the position of those first human rows.
pub fn fold_conversations(rows: &[MessageRow]) -> Vec<Conversation> {
    let mut named = HashSet::new();
    let mut conversations = Vec::new();

    for row in rows {
        if row.message.kind != MessageKind::Human || !named.insert(&row.session_id) {
            continue;
        }
        conversations.push(Conversation::new(
            row.session_id.clone(),
            conversation_title(&row.message.content),
        ));
    }

    conversations
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn rows(entries: &[(&str, MessagePayload)]) -> Vec<MessageRow> {
        let start = Utc
            .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
            .single()
            .expect("valid fixture time");
        entries
            .iter()
            .enumerate()
            .map(|(index, (session, message))| MessageRow {
                session_id: SessionId::parse(session).expect("valid id"),
                message: message.clone(),
                created_at: start + Duration::seconds(index as i64),
            })
            .collect()
    }

    #[test]
    fn short_titles_are_kept_verbatim() {
        assert_eq!(conversation_title("Hi"), "Hi");
        assert_eq!(conversation_title(""), "");

        let exactly_max = "a".repeat(TITLE_MAX_CHARS);
        assert_eq!(conversation_title(&exactly_max), exactly_max);
    }

    #[test]
    fn long_titles_are_cut_at_one_hundred_characters() {
        let long = "b".repeat(TITLE_MAX_CHARS + 1);
        let title = conversation_title(&long);

        assert_eq!(title, format!("{}...", "b".repeat(TITLE_MAX_CHARS)));
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + TITLE_ELLIPSIS.len());
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let wide = "é".repeat(TITLE_MAX_CHARS + 5);
        let title = conversation_title(&wide);

        assert!(title.starts_with(&"é".repeat(TITLE_MAX_CHARS)));
        assert!(title.ends_with(TITLE_ELLIPSIS));
    }

    #[test]
    fn first_human_message_names_each_session() {
        let listing = rows(&[
            ("s1", MessagePayload::ai("greeting before any question")),
            ("s1", MessagePayload::human("first question")),
            ("s2", MessagePayload::human("other thread")),
            ("s1", MessagePayload::human("second question")),
            ("s3", MessagePayload::ai("no human here")),
        ]);

        let conversations = fold_conversations(&listing);
        let summary = conversations
            .iter()
            .map(|conversation| (conversation.session_id.as_str(), conversation.title.as_str()))
            .collect::<Vec<_>>();

        assert_eq!(
            summary,
            vec![("s1", "first question"), ("s2", "other thread")]
        );
    }

    #[test]
    fn rows_convert_into_thread_messages() {
        let listing = rows(&[("abc", MessagePayload::ai("Hello!"))]);
        assert_eq!(Message::from(&listing[0]), Message::ai("Hello!"));
    }
}

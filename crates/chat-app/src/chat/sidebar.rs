use tern_storage::SessionId;

use crate::chat::message::Conversation;

/// One rendered sidebar row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    /// 1-based position, as typed by the user to open it.
    pub position: usize,
    pub session_id: SessionId,
    pub title: String,
    pub active: bool,
}

pub fn sidebar_entries(
    conversations: &[Conversation],
    active_session_id: Option<&SessionId>,
) -> Vec<SidebarEntry> {
    conversations
        .iter()
        .enumerate()
        .map(|(index, conversation)| SidebarEntry {
            position: index + 1,
            session_id: conversation.session_id.clone(),
            title: conversation.title.clone(),
            active: active_session_id == Some(&conversation.session_id),
        })
        .collect()
}

/// Prefix that forces a selection to be read as a session id.
pub const SESSION_ID_PREFIX: &str = "id:";

/// Resolves a sidebar selection typed as a list position or as a session id.
///
/// Digits name a position first; when no entry sits there, a listed session with that
/// exact id is used instead. `id:<session>` skips position lookup entirely, and any
/// other non-blank text is taken as a session id, listed or not.
pub fn resolve_selection(conversations: &[Conversation], raw: &str) -> Option<SessionId> {
    let raw = raw.trim();
    if let Some(session) = raw.strip_prefix(SESSION_ID_PREFIX) {
        return SessionId::parse(session).ok();
    }

    if let Ok(position) = raw.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|index| conversations.get(index))
            .or_else(|| {
                conversations
                    .iter()
                    .find(|conversation| conversation.session_id.as_str() == raw)
            })
            .map(|conversation| conversation.session_id.clone());
    }

    SessionId::parse(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversations() -> Vec<Conversation> {
        ["abc", "def"]
            .into_iter()
            .map(|raw| Conversation::new(SessionId::parse(raw).expect("valid id"), raw))
            .collect()
    }

    #[test]
    fn entries_mark_the_active_session() {
        let active = SessionId::parse("def").expect("valid id");
        let entries = sidebar_entries(&conversations(), Some(&active));

        assert_eq!(
            entries
                .iter()
                .map(|entry| (entry.position, entry.active))
                .collect::<Vec<_>>(),
            vec![(1, false), (2, true)]
        );
    }

    #[test]
    fn selections_resolve_by_position_or_id() {
        let listed = conversations();

        assert_eq!(
            resolve_selection(&listed, "2").map(|id| id.to_string()),
            Some("def".to_string())
        );
        assert_eq!(resolve_selection(&listed, "0"), None);
        assert_eq!(resolve_selection(&listed, "3"), None);
        assert_eq!(
            resolve_selection(&listed, " unlisted ").map(|id| id.to_string()),
            Some("unlisted".to_string())
        );
        assert_eq!(resolve_selection(&listed, "  "), None);
        assert_eq!(resolve_selection(&listed, "id: "), None);
    }

    #[test]
    fn numeric_session_ids_stay_reachable() {
        let listed = ["abc", "42"]
            .into_iter()
            .map(|raw| Conversation::new(SessionId::parse(raw).expect("valid id"), raw))
            .collect::<Vec<_>>();

        assert_eq!(
            resolve_selection(&listed, "42").map(|id| id.to_string()),
            Some("42".to_string())
        );
        assert_eq!(
            resolve_selection(&listed, "2").map(|id| id.to_string()),
            Some("42".to_string())
        );
        assert_eq!(
            resolve_selection(&listed, "id:2").map(|id| id.to_string()),
            Some("2".to_string())
        );
        assert_eq!(resolve_selection(&listed, "7"), None);
    }
}

use tern_storage::SessionId;

use crate::chat::message::{Conversation, Message};

/// Commands the front-end sends into the controller loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    StartNewChat,
    SendMessage(String),
    /// Sidebar selection by list position (1-based) or by raw session id.
    OpenConversation(String),
    RefreshConversations,
    ToggleSidebar,
    SignOut,
}

/// User-facing toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
        }
    }
}

/// Everything a renderer needs to mirror controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    ConversationsChanged(Vec<Conversation>),
    ActiveSessionChanged(Option<SessionId>),
    MessagesChanged { total: usize },
    /// Messages that become visible once the view follows the tail.
    ScrollToBottom {
        revealed: Vec<Message>,
        replaced: bool,
    },
    LoadingChanged(bool),
    SidebarToggled(bool),
    Notify(Notice),
}

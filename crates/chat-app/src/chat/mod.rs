/// Single-task state machine driving the chat session.
pub mod controller;
/// Command and event contracts between the controller and a front-end.
pub mod events;
/// View-level message and conversation types.
pub mod message;
pub mod request_token;
pub mod scroll_manager;
pub mod sidebar;
pub mod subscription;

pub use controller::{
    ChatBackends, ChatController, ChatPhase, ChatState, FETCH_CONVERSATIONS_FAILED,
    LOAD_CONVERSATION_FAILED, SEND_MESSAGE_FAILED,
};
pub use events::{ChatCommand, ChatEvent, Notice};
pub use message::{Conversation, Message, conversation_title, fold_conversations};
pub use request_token::{RequestKind, RequestToken, RequestTokens};
pub use scroll_manager::{ScrollManager, TAIL_WINDOW};
pub use sidebar::{SidebarEntry, resolve_selection, sidebar_entries};
pub use subscription::{FeedDelivery, SessionSubscription};

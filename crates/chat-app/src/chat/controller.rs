use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tern_agent::{AgentEndpoint, AgentRequest, AgentResult};
use tern_storage::{
    FeedSubscription, MessageFeed, MessageKind, MessageRow, MessageTable, SessionId, StorageResult,
};
use tokio::sync::mpsc;

use crate::chat::events::{ChatCommand, ChatEvent, Notice};
use crate::chat::message::{Conversation, Message, fold_conversations};
use crate::chat::request_token::{RequestKind, RequestToken, RequestTokens};
use crate::chat::scroll_manager::ScrollManager;
use crate::chat::sidebar::resolve_selection;
use crate::chat::subscription::{FeedDelivery, SessionSubscription};

pub const FETCH_CONVERSATIONS_FAILED: &str = "Failed to fetch conversations";
pub const LOAD_CONVERSATION_FAILED: &str = "Failed to load conversation";
pub const SEND_MESSAGE_FAILED: &str = "Failed to send message";

/// External collaborators the controller drives.
#[derive(Clone)]
pub struct ChatBackends {
    pub table: Arc<dyn MessageTable>,
    pub feed: Arc<dyn MessageFeed>,
    pub agent: Arc<dyn AgentEndpoint>,
    pub user_id: String,
}

/// Per-session lifecycle as seen by the input box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatPhase {
    NoSession,
    /// A session is active and nothing is pending.
    Active,
    /// A message was sent and the agent reply has not arrived through the feed yet.
    AwaitingReply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatState {
    pub active_session_id: Option<SessionId>,
    pub messages: Vec<Message>,
    /// True only while the agent HTTP call is outstanding.
    pub loading: bool,
    pub conversations: Vec<Conversation>,
    pub sidebar_open: bool,
    pub awaiting_reply: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            active_session_id: None,
            messages: Vec::new(),
            loading: false,
            conversations: Vec::new(),
            sidebar_open: true,
            awaiting_reply: false,
        }
    }
}

impl ChatState {
    pub fn phase(&self) -> ChatPhase {
        match (&self.active_session_id, self.awaiting_reply) {
            (None, _) => ChatPhase::NoSession,
            (Some(_), true) => ChatPhase::AwaitingReply,
            (Some(_), false) => ChatPhase::Active,
        }
    }

    fn is_active(&self, session_id: &SessionId) -> bool {
        self.active_session_id.as_ref() == Some(session_id)
    }
}

enum Outcome {
    ConversationsFetched {
        token: RequestToken,
        result: StorageResult<Vec<MessageRow>>,
    },
    ConversationLoaded {
        token: RequestToken,
        session_id: SessionId,
        result: StorageResult<Vec<MessageRow>>,
    },
    MessageSent {
        session_id: SessionId,
        result: AgentResult<tern_agent::AgentResponse>,
    },
    SubscriptionOpened {
        token: RequestToken,
        session_id: SessionId,
        result: StorageResult<FeedSubscription>,
    },
}

/// Owns chat state and applies commands, call outcomes and feed deliveries one at a time.
///
/// Store and agent calls run as spawned tasks; their results come back through an
/// internal channel tagged with a [`RequestToken`], and results whose token was
/// superseded are dropped instead of overwriting newer state.
pub struct ChatController {
    backends: ChatBackends,
    state: ChatState,
    tokens: RequestTokens,
    subscription: SessionSubscription,
    scroll: ScrollManager,
    outcome_tx: mpsc::UnboundedSender<Outcome>,
    outcome_rx: mpsc::UnboundedReceiver<Outcome>,
    events: mpsc::UnboundedSender<ChatEvent>,
    in_flight: usize,
}

impl ChatController {
    pub fn new(backends: ChatBackends, events: mpsc::UnboundedSender<ChatEvent>) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            backends,
            state: ChatState::default(),
            tokens: RequestTokens::new(),
            subscription: SessionSubscription::new(),
            scroll: ScrollManager::new(),
            outcome_tx,
            outcome_rx,
            events,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn phase(&self) -> ChatPhase {
        self.state.phase()
    }

    pub fn subscribed_session(&self) -> Option<&SessionId> {
        self.subscription.session_id()
    }

    pub fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::StartNewChat => {
                self.start_new_chat();
            }
            ChatCommand::SendMessage(content) => self.send_message(content),
            ChatCommand::OpenConversation(raw) => {
                match resolve_selection(&self.state.conversations, &raw) {
                    Some(session_id) => self.load_conversation(session_id),
                    None => self.emit(ChatEvent::Notify(Notice::error(format!(
                        "No conversation matches '{}'",
                        raw.trim()
                    )))),
                }
            }
            ChatCommand::RefreshConversations => self.fetch_conversations(),
            ChatCommand::ToggleSidebar => self.toggle_sidebar(),
            ChatCommand::SignOut => self.sign_out(),
        }
    }

    pub fn fetch_conversations(&mut self) {
        let token = self.tokens.issue(RequestKind::Conversations);
        let table = Arc::clone(&self.backends.table);
        self.spawn(async move {
            let result = table.list_messages().await;
            Outcome::ConversationsFetched { token, result }
        });
    }

    pub fn load_conversation(&mut self, session_id: SessionId) {
        let token = self.tokens.issue(RequestKind::Load);
        let table = Arc::clone(&self.backends.table);
        self.spawn(async move {
            let result = table.list_session_messages(&session_id).await;
            Outcome::ConversationLoaded {
                token,
                session_id,
                result,
            }
        });
    }

    /// Switches to a fresh session. Nothing is written until a message is sent.
    pub fn start_new_chat(&mut self) -> SessionId {
        // A load landing after this point would pull the view back to an older session.
        self.tokens.invalidate(RequestKind::Load);

        let session_id = SessionId::new_v4();
        self.replace_messages(Vec::new());
        self.activate_session(session_id.clone());
        session_id
    }

    /// Posts `content` to the agent for the active session.
    ///
    /// Without an active session this only starts one. The user's own message is not
    /// added locally; it shows up once the stored row comes back through the feed.
    pub fn send_message(&mut self, content: impl Into<String>) {
        let Some(session_id) = self.state.active_session_id.clone() else {
            tracing::info!("no active session, starting one instead of sending");
            self.start_new_chat();
            return;
        };

        if self.state.loading {
            tracing::warn!(session_id = %session_id, "send ignored while a request is outstanding");
            return;
        }

        self.set_loading(true);
        self.state.awaiting_reply = true;

        let request = AgentRequest::new(
            content,
            self.backends.user_id.clone(),
            session_id.to_string(),
        );
        tracing::info!(
            session_id = %session_id,
            request_id = %request.request_id,
            "sending message to agent"
        );

        let agent = Arc::clone(&self.backends.agent);
        self.spawn(async move {
            let result = agent.submit(request).await;
            Outcome::MessageSent { session_id, result }
        });
    }

    pub fn toggle_sidebar(&mut self) {
        self.state.sidebar_open = !self.state.sidebar_open;
        self.emit(ChatEvent::SidebarToggled(self.state.sidebar_open));
    }

    pub fn sign_out(&self) {
        tracing::info!("sign-out requested; no identity provider is configured");
    }

    /// Applies the next outcome or feed delivery.
    ///
    /// Returns `false` without waiting when nothing is in flight and no feed is live.
    pub async fn step(&mut self) -> bool {
        if self.in_flight == 0 && !self.subscription.is_live() {
            return false;
        }

        tokio::select! {
            Some(outcome) = self.outcome_rx.recv() => self.apply_outcome(outcome),
            delivery = self.subscription.recv() => self.apply_delivery(delivery),
        }
        true
    }

    /// Applies outcomes until every spawned call has reported back.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            self.step().await;
        }
    }

    /// Event loop: runs until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ChatCommand>) {
        self.fetch_conversations();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(outcome) = self.outcome_rx.recv() => self.apply_outcome(outcome),
                delivery = self.subscription.recv() => self.apply_delivery(delivery),
            }
        }

        self.subscription.release();
        tracing::info!("chat controller stopped");
    }

    fn spawn<F>(&mut self, work: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        self.in_flight += 1;
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let _ = outcome_tx.send(work.await);
        });
    }

    fn activate_session(&mut self, session_id: SessionId) {
        if self.state.is_active(&session_id) {
            // The feed may have ended or failed to open; reopening re-acquires it.
            if self.subscription.session_id() != Some(&session_id) {
                tracing::info!(session_id = %session_id, "re-acquiring feed subscription");
                self.resubscribe(session_id);
            }
            return;
        }

        tracing::info!(session_id = %session_id, "activating session");
        self.state.active_session_id = Some(session_id.clone());
        self.state.awaiting_reply = false;
        self.emit(ChatEvent::ActiveSessionChanged(Some(session_id.clone())));

        self.resubscribe(session_id);
        self.fetch_conversations();
    }

    fn resubscribe(&mut self, session_id: SessionId) {
        self.subscription.release();

        let token = self.tokens.issue(RequestKind::Subscription);
        let feed = Arc::clone(&self.backends.feed);
        self.spawn(async move {
            let result = feed.subscribe().await;
            Outcome::SubscriptionOpened {
                token,
                session_id,
                result,
            }
        });
    }

    fn apply_outcome(&mut self, outcome: Outcome) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome {
            Outcome::ConversationsFetched { token, result } => {
                self.finish_fetch_conversations(token, result)
            }
            Outcome::ConversationLoaded {
                token,
                session_id,
                result,
            } => self.finish_load_conversation(token, session_id, result),
            Outcome::MessageSent { session_id, result } => self.finish_send(session_id, result),
            Outcome::SubscriptionOpened {
                token,
                session_id,
                result,
            } => self.finish_subscribe(token, session_id, result),
        }
    }

    fn finish_fetch_conversations(
        &mut self,
        token: RequestToken,
        result: StorageResult<Vec<MessageRow>>,
    ) {
        if !self.tokens.is_current(token) {
            tracing::debug!(seq = token.seq, "discarding superseded conversation listing");
            return;
        }

        match result {
            Ok(rows) => {
                self.state.conversations = fold_conversations(&rows);
                self.emit(ChatEvent::ConversationsChanged(
                    self.state.conversations.clone(),
                ));
            }
            Err(error) => self.report_failure(FETCH_CONVERSATIONS_FAILED, &error),
        }
    }

    fn finish_load_conversation(
        &mut self,
        token: RequestToken,
        session_id: SessionId,
        result: StorageResult<Vec<MessageRow>>,
    ) {
        if !self.tokens.is_current(token) {
            tracing::debug!(
                seq = token.seq,
                session_id = %session_id,
                "discarding superseded conversation load"
            );
            return;
        }

        match result {
            Ok(rows) => {
                self.replace_messages(rows.iter().map(Message::from).collect());
                self.activate_session(session_id);
            }
            Err(error) => self.report_failure(LOAD_CONVERSATION_FAILED, &error),
        }
    }

    fn finish_send(
        &mut self,
        session_id: SessionId,
        result: AgentResult<tern_agent::AgentResponse>,
    ) {
        self.set_loading(false);

        match result {
            Ok(_) => tracing::info!(session_id = %session_id, "agent accepted message"),
            Err(error) => {
                if self.state.is_active(&session_id) {
                    self.state.awaiting_reply = false;
                }
                self.report_failure(SEND_MESSAGE_FAILED, &error);
            }
        }
    }

    fn finish_subscribe(
        &mut self,
        token: RequestToken,
        session_id: SessionId,
        result: StorageResult<FeedSubscription>,
    ) {
        // Dropping a stale subscription closes it.
        if !self.tokens.is_current(token) || !self.state.is_active(&session_id) {
            tracing::debug!(session_id = %session_id, "dropping subscription for inactive session");
            return;
        }

        match result {
            Ok(feed) => self.subscription.install(session_id, feed),
            Err(error) => {
                tracing::warn!(session_id = %session_id, "realtime subscription failed: {error}")
            }
        }
    }

    fn apply_delivery(&mut self, delivery: FeedDelivery) {
        match delivery {
            FeedDelivery::Insert(event) => {
                let row = event.row;
                if !self.state.is_active(&row.session_id) {
                    tracing::debug!(session_id = %row.session_id, "ignoring insert for inactive session");
                    return;
                }

                if row.message.kind == MessageKind::Ai {
                    self.state.awaiting_reply = false;
                }
                self.append_message(Message::from(row.message));
            }
            FeedDelivery::Ended(session_id) => {
                tracing::warn!(
                    session_id = %session_id,
                    "realtime feed ended; reopen the conversation to catch up"
                );
                self.subscription.release();
            }
        }
    }

    fn replace_messages(&mut self, messages: Vec<Message>) {
        self.state.messages = messages;
        self.emit(ChatEvent::MessagesChanged {
            total: self.state.messages.len(),
        });
        let scroll = self.scroll.reset(&self.state.messages);
        self.emit(scroll);
    }

    fn append_message(&mut self, message: Message) {
        self.state.messages.push(message);
        self.emit(ChatEvent::MessagesChanged {
            total: self.state.messages.len(),
        });
        let scroll = self.scroll.follow(&self.state.messages);
        self.emit(scroll);
    }

    fn set_loading(&mut self, loading: bool) {
        if self.state.loading != loading {
            self.state.loading = loading;
            self.emit(ChatEvent::LoadingChanged(loading));
        }
    }

    fn report_failure(&self, description: &'static str, error: &dyn Display) {
        tracing::error!("{description}: {error}");
        self.emit(ChatEvent::Notify(Notice::error(description)));
    }

    fn emit(&self, event: ChatEvent) {
        // The renderer may already be gone during shutdown.
        let _ = self.events.send(event);
    }
}

use std::io::Write;
use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tern_agent::{AgentClient, AgentError};
use tern_storage::{
    MessageFeed, MessageKind, MessageTable, RealtimeFeed, RestMessageTable, SessionId,
    SqliteMessageTable, StorageError,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::chat::{
    ChatBackends, ChatCommand, ChatController, ChatEvent, Conversation, Message, Notice,
    sidebar_entries,
};
use crate::settings::{Settings, StoreBackend};

pub const HELP_TEXT: &str = "\
commands:
  /new              start a new chat
  /list             show conversations
  /open <n|id>      open a conversation by list position or session id (id:<id> forces an id)
  /sidebar          show or hide the conversation list
  /reload           refetch conversations
  /signout          sign out
  /help             show this help
  /quit             exit
anything else is sent to the agent";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to open message store on `{stage}`: {source}"))]
    OpenStore {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("remote store selected but `store.remote.url` is empty on `{stage}`"))]
    MissingRemoteUrl { stage: &'static str },
    #[snafu(display("failed to build agent client on `{stage}`: {source}"))]
    BuildAgent {
        stage: &'static str,
        source: AgentError,
    },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("chat controller task failed on `{stage}`: {source}"))]
    JoinController {
        stage: &'static str,
        source: tokio::task::JoinError,
    },
}

/// What one line of terminal input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Command(ChatCommand),
    ListConversations,
    Help,
    Quit,
    Unknown(String),
}

/// Blank lines yield `None`.
pub fn parse_input(line: &str) -> Option<InputAction> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(command) = line.strip_prefix('/') else {
        return Some(InputAction::Command(ChatCommand::SendMessage(
            line.to_string(),
        )));
    };

    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (command, ""),
    };

    let action = match name {
        "new" => InputAction::Command(ChatCommand::StartNewChat),
        "list" => InputAction::ListConversations,
        "open" if !argument.is_empty() => {
            InputAction::Command(ChatCommand::OpenConversation(argument.to_string()))
        }
        "sidebar" => InputAction::Command(ChatCommand::ToggleSidebar),
        "reload" => InputAction::Command(ChatCommand::RefreshConversations),
        "signout" => InputAction::Command(ChatCommand::SignOut),
        "help" => InputAction::Help,
        "quit" | "exit" => InputAction::Quit,
        _ => InputAction::Unknown(line.to_string()),
    };
    Some(action)
}

/// Opens the configured message store and agent client.
pub async fn build_backends(settings: &Settings) -> Result<ChatBackends, AppError> {
    let agent = AgentClient::new(settings.agent.to_agent_config()).context(BuildAgentSnafu {
        stage: "build-agent-client",
    })?;

    let (table, feed): (Arc<dyn MessageTable>, Arc<dyn MessageFeed>) =
        match settings.store.backend {
            StoreBackend::Sqlite => {
                let location = settings.store.sqlite_path.to_string_lossy();
                let table = SqliteMessageTable::open(&location)
                    .await
                    .context(OpenStoreSnafu {
                        stage: "open-sqlite-store",
                    })?;
                (Arc::new(table.clone()), Arc::new(table))
            }
            StoreBackend::Remote => {
                let Some(config) = settings.store.remote.to_table_config() else {
                    return MissingRemoteUrlSnafu {
                        stage: "configure-remote-store",
                    }
                    .fail();
                };
                let table = RestMessageTable::new(config.clone()).context(OpenStoreSnafu {
                    stage: "build-rest-table",
                })?;
                (Arc::new(table), Arc::new(RealtimeFeed::new(config)))
            }
        };

    tracing::info!(
        backend = ?settings.store.backend,
        agent = %agent.endpoint(),
        "chat backends ready"
    );

    Ok(ChatBackends {
        table,
        feed,
        agent: Arc::new(agent),
        user_id: settings.agent.user_id.clone(),
    })
}

/// Mirrors controller events as plain transcript lines.
pub struct TerminalRenderer<W> {
    out: W,
    conversations: Vec<Conversation>,
    active_session_id: Option<SessionId>,
    sidebar_open: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            conversations: Vec::new(),
            active_session_id: None,
            sidebar_open: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: &ChatEvent) -> std::io::Result<()> {
        match event {
            ChatEvent::ConversationsChanged(conversations) => {
                self.conversations = conversations.clone();
                if self.sidebar_open {
                    self.render_sidebar()?;
                }
            }
            ChatEvent::ActiveSessionChanged(session_id) => {
                self.active_session_id = session_id.clone();
                match session_id {
                    Some(session_id) => writeln!(self.out, "-- session {session_id}")?,
                    None => writeln!(self.out, "-- no session")?,
                }
            }
            ChatEvent::MessagesChanged { .. } => {}
            ChatEvent::ScrollToBottom { revealed, replaced } => {
                if *replaced {
                    writeln!(self.out, "--")?;
                }
                for message in revealed {
                    self.render_message(message)?;
                }
            }
            ChatEvent::LoadingChanged(true) => writeln!(self.out, "... waiting for agent")?,
            ChatEvent::LoadingChanged(false) => {}
            ChatEvent::SidebarToggled(open) => {
                self.sidebar_open = *open;
                if *open {
                    self.render_sidebar()?;
                } else {
                    writeln!(self.out, "-- sidebar hidden")?;
                }
            }
            ChatEvent::Notify(notice) => self.render_notice(notice)?,
        }
        self.out.flush()
    }

    pub fn render_sidebar(&mut self) -> std::io::Result<()> {
        writeln!(self.out, "conversations:")?;
        let entries = sidebar_entries(&self.conversations, self.active_session_id.as_ref());
        if entries.is_empty() {
            writeln!(self.out, "  (none)")?;
        }
        for entry in entries {
            let marker = if entry.active { '*' } else { ' ' };
            writeln!(self.out, "{marker} {}. {}", entry.position, entry.title)?;
        }
        self.out.flush()
    }

    pub fn render_line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    fn render_message(&mut self, message: &Message) -> std::io::Result<()> {
        let speaker = match message.kind {
            MessageKind::Human => "you",
            MessageKind::Ai => "agent",
        };
        writeln!(self.out, "{speaker}> {}", message.content)
    }

    fn render_notice(&mut self, notice: &Notice) -> std::io::Result<()> {
        writeln!(self.out, "[{}] {}", notice.title, notice.description)
    }
}

/// Runs the terminal chat until `/quit` or end of input.
pub async fn run(settings: &Settings) -> Result<(), AppError> {
    let backends = build_backends(settings).await?;

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let controller = tokio::spawn(ChatController::new(backends, event_tx).run(command_rx));

    let mut renderer = TerminalRenderer::new(std::io::stdout());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.context(ReadInputSnafu { stage: "read-stdin-line" })?;
                let Some(line) = line else {
                    tracing::info!("input closed");
                    break;
                };

                match parse_input(&line) {
                    None => {}
                    Some(InputAction::Command(command)) => {
                        if command_tx.send(command).is_err() {
                            tracing::warn!("chat controller stopped unexpectedly");
                            break;
                        }
                    }
                    Some(InputAction::ListConversations) => renderer
                        .render_sidebar()
                        .context(WriteOutputSnafu { stage: "render-sidebar" })?,
                    Some(InputAction::Help) => renderer
                        .render_line(HELP_TEXT)
                        .context(WriteOutputSnafu { stage: "render-help" })?,
                    Some(InputAction::Quit) => break,
                    Some(InputAction::Unknown(input)) => renderer
                        .render_line(&format!("unknown command `{input}`, try /help"))
                        .context(WriteOutputSnafu { stage: "render-unknown-command" })?,
                }
            }
            Some(event) = events.recv() => {
                renderer
                    .render(&event)
                    .context(WriteOutputSnafu { stage: "render-event" })?;
            }
        }
    }

    drop(command_tx);
    controller.await.context(JoinControllerSnafu {
        stage: "join-chat-controller",
    })?;

    while let Ok(event) = events.try_recv() {
        renderer
            .render(&event)
            .context(WriteOutputSnafu { stage: "render-final-events" })?;
    }
    Ok(())
}

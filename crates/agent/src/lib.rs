use std::future::Future;
use std::pin::Pin;

mod client;
mod error;
mod request;

pub use client::{
    AgentClient, AgentConfig, DEFAULT_AGENT_ENDPOINT, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_ID,
};
pub use error::{AgentError, AgentResult};
pub use request::{AgentRequest, AgentResponse};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Triggers agent processing for one query.
///
/// Success only means the agent accepted the request; its reply is written to the
/// message table by the agent itself.
pub trait AgentEndpoint: Send + Sync {
    fn submit(&self, request: AgentRequest) -> BoxFuture<'_, AgentResult<AgentResponse>>;
}

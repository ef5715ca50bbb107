use std::time::Duration;

use reqwest::{Client, Url};
use snafu::{ResultExt, ensure};

use super::error::{
    AgentResult, BuildHttpClientSnafu, DecodeResponseSnafu, HttpRequestSnafu, HttpStatusSnafu,
    InvalidEndpointSnafu, RejectedSnafu,
};
use super::request::{AgentRequest, AgentResponse};
use super::{AgentEndpoint, BoxFuture};

pub const DEFAULT_AGENT_ENDPOINT: &str = "http://localhost:8001/api/pydantic-github-agent";
/// User id sent with every request; the front-end has no user identity of its own.
pub const DEFAULT_USER_ID: &str = "NA";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub endpoint: String,
    pub user_id: String,
    pub timeout: Duration,
}

impl AgentConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim().to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_ENDPOINT)
    }
}

/// HTTP client for the agent endpoint.
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: Client,
    endpoint: Url,
    user_id: String,
}

impl AgentClient {
    pub fn new(config: AgentConfig) -> AgentResult<Self> {
        let endpoint = Url::parse(&config.endpoint).ok().filter(|url| {
            matches!(url.scheme(), "http" | "https")
        });
        let Some(endpoint) = endpoint else {
            return InvalidEndpointSnafu {
                stage: "agent-client-new",
                endpoint: config.endpoint,
            }
            .fail();
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "agent-client-build",
            })?;

        Ok(Self {
            client,
            endpoint,
            user_id: config.user_id,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, request: AgentRequest) -> AgentResult<AgentResponse> {
        let request_id = request.request_id;
        tracing::debug!(%request_id, session_id = %request.session_id, "posting agent request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .context(HttpRequestSnafu {
                stage: "agent-send",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return HttpStatusSnafu {
                stage: "agent-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let payload = response
            .json::<AgentResponse>()
            .await
            .context(DecodeResponseSnafu {
                stage: "agent-decode",
            })?;

        ensure!(
            payload.success,
            RejectedSnafu {
                stage: "agent-success-flag",
                request_id,
            }
        );
        Ok(payload)
    }
}

impl AgentEndpoint for AgentClient {
    fn submit(&self, request: AgentRequest) -> BoxFuture<'_, AgentResult<AgentResponse>> {
        Box::pin(self.post(request))
    }
}

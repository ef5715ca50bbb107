use snafu::Snafu;
use uuid::Uuid;

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AgentError {
    #[snafu(display("agent endpoint '{endpoint}' is invalid"))]
    InvalidEndpoint {
        stage: &'static str,
        endpoint: String,
    },
    #[snafu(display("failed to build http client: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("http request failed on `{stage}`, {source}"))]
    HttpRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("agent endpoint returned status {status}: {body}"))]
    HttpStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode agent response on `{stage}`: {source}"))]
    DecodeResponse {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("agent rejected request {request_id}"))]
    Rejected {
        stage: &'static str,
        request_id: Uuid,
    },
}

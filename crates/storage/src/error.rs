use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("session id '{raw}' is invalid"))]
    InvalidSessionId { stage: &'static str, raw: String },
    #[snafu(display("storage invariant violation: {details}"))]
    InvariantViolation {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("failed to create sqlite directory at {path}"))]
    CreateSqliteDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse sqlite connection URL '{database_url}'"))]
    SqliteConnectOptions {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("failed to connect sqlite database '{database_url}'"))]
    SqliteConnect {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("failed to run sqlite migrations"))]
    SqliteMigrate {
        stage: &'static str,
        source: sqlx::migrate::MigrateError,
    },
    #[snafu(display("sqlite query failed at {stage}: {source}"))]
    SqliteQuery {
        stage: &'static str,
        source: sqlx::Error,
    },
    #[snafu(display("failed to encode message payload at {stage}: {source}"))]
    EncodePayload {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to decode message payload at {stage}: {source}"))]
    DecodePayload {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("timestamp '{value}' is out of range"))]
    InvalidTimestamp { stage: &'static str, value: i64 },
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
    #[snafu(display("remote table returned status {status} on `{stage}`: {body}"))]
    HttpStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode remote table response on `{stage}`: {source}"))]
    DecodeResponse {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("remote URL '{url}' is invalid: {details}"))]
    InvalidRemoteUrl {
        stage: &'static str,
        url: String,
        details: String,
    },
    #[snafu(display("failed to connect realtime socket '{url}': {source}"))]
    WebSocketConnect {
        stage: &'static str,
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("failed to send realtime frame on `{stage}`: {source}"))]
    WebSocketSend {
        stage: &'static str,
        source: tokio_tungstenite::tungstenite::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

use reqwest::{Client, RequestBuilder, Response};
use snafu::{OptionExt, ResultExt};

use super::error::{
    BuildHttpClientSnafu, DecodeResponseSnafu, HttpRequestSnafu, HttpStatusSnafu,
    InvariantViolationSnafu, StorageResult,
};
use super::ids::SessionId;
use super::types::{DEFAULT_SCHEMA, DEFAULT_TABLE, MessageRow, NewMessageRow};
use super::{BoxFuture, MessageTable};

/// Columns selected on every read.
const SELECT_COLUMNS: &str = "session_id,message,created_at";

/// Connection details for the hosted table (PostgREST + Realtime on one base URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTableConfig {
    pub url: String,
    pub api_key: String,
    pub schema: String,
    pub table: String,
}

impl RemoteTableConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn rest_endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }
}

/// PostgREST-backed message table.
#[derive(Debug, Clone)]
pub struct RestMessageTable {
    client: Client,
    config: RemoteTableConfig,
}

impl RestMessageTable {
    pub fn new(config: RemoteTableConfig) -> StorageResult<Self> {
        let client = Client::builder().build().context(BuildHttpClientSnafu {
            stage: "rest-table-build-client",
        })?;
        Ok(Self { client, config })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn fetch_rows(
        &self,
        session_id: Option<&SessionId>,
        stage: &'static str,
    ) -> StorageResult<Vec<MessageRow>> {
        let request = self
            .authorized(self.client.get(self.config.rest_endpoint()))
            .header("Accept-Profile", &self.config.schema)
            .query(&read_query(session_id));

        let response = request.send().await.context(HttpRequestSnafu { stage })?;
        let response = ensure_success(response, stage).await?;
        response
            .json::<Vec<MessageRow>>()
            .await
            .context(DecodeResponseSnafu { stage })
    }

    async fn insert_row(&self, row: NewMessageRow) -> StorageResult<MessageRow> {
        let stage = "rest-table-insert";
        let request = self
            .authorized(self.client.post(self.config.rest_endpoint()))
            .header("Content-Profile", &self.config.schema)
            .header("Prefer", "return=representation")
            .query(&[("select", SELECT_COLUMNS)])
            .json(&row);

        let response = request.send().await.context(HttpRequestSnafu { stage })?;
        let response = ensure_success(response, stage).await?;
        let inserted = response
            .json::<Vec<MessageRow>>()
            .await
            .context(DecodeResponseSnafu { stage })?;

        inserted.into_iter().next().context(InvariantViolationSnafu {
            stage,
            details: "insert returned no representation".to_string(),
        })
    }
}

impl MessageTable for RestMessageTable {
    fn list_messages(&self) -> BoxFuture<'_, StorageResult<Vec<MessageRow>>> {
        Box::pin(self.fetch_rows(None, "rest-table-list-all"))
    }

    fn list_session_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, StorageResult<Vec<MessageRow>>> {
        Box::pin(self.fetch_rows(Some(session_id), "rest-table-list-session"))
    }

    fn insert_message(&self, row: NewMessageRow) -> BoxFuture<'_, StorageResult<MessageRow>> {
        Box::pin(self.insert_row(row))
    }
}

fn read_query(session_id: Option<&SessionId>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", SELECT_COLUMNS.to_string()),
        ("order", "created_at.asc".to_string()),
    ];
    if let Some(session_id) = session_id {
        query.push(("session_id", format!("eq.{session_id}")));
    }
    query
}

async fn ensure_success(response: Response, stage: &'static str) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    HttpStatusSnafu {
        stage,
        status: status.as_u16(),
        body,
    }
    .fail()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::{RawQuery, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;

    use super::*;
    use crate::error::StorageError;
    use crate::types::MessagePayload;

    #[derive(Clone, Default)]
    struct Captured {
        queries: Arc<Mutex<Vec<String>>>,
        api_keys: Arc<Mutex<Vec<String>>>,
    }

    async fn list_rows(
        State(captured): State<Captured>,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
    ) -> axum::Json<serde_json::Value> {
        captured
            .queries
            .lock()
            .expect("query log lock")
            .push(query.unwrap_or_default());
        captured.api_keys.lock().expect("header log lock").push(
            headers
                .get("apikey")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        );

        axum::Json(serde_json::json!([
            {
                "session_id": "abc",
                "message": { "content": "Hi", "type": "human" },
                "created_at": "2026-01-02T03:04:05.000001+00:00"
            },
            {
                "session_id": "abc",
                "message": { "content": "Hello!", "type": "ai" },
                "created_at": "2026-01-02T03:04:06+00:00"
            }
        ]))
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let address = listener.local_addr().expect("local address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    #[test]
    fn read_queries_filter_by_session_and_order_ascending() {
        let all = read_query(None);
        assert_eq!(
            all,
            vec![
                ("select", SELECT_COLUMNS.to_string()),
                ("order", "created_at.asc".to_string()),
            ]
        );

        let session_id = SessionId::parse("abc").expect("valid id");
        let one = read_query(Some(&session_id));
        assert_eq!(one.last(), Some(&("session_id", "eq.abc".to_string())));
    }

    #[test]
    fn config_trims_trailing_slashes() {
        let config = RemoteTableConfig::new("https://project.example.co/ ", " key ");
        assert_eq!(
            config.rest_endpoint(),
            "https://project.example.co/rest/v1/messages"
        );
        assert_eq!(config.api_key, "key");
    }

    #[tokio::test]
    async fn session_reads_send_filter_and_credentials() {
        let captured = Captured::default();
        let router = Router::new()
            .route("/rest/v1/messages", get(list_rows))
            .with_state(captured.clone());
        let base_url = serve(router).await;

        let table = RestMessageTable::new(RemoteTableConfig::new(base_url, "anon-key"))
            .expect("client builds");
        let session_id = SessionId::parse("abc").expect("valid id");
        let rows = table
            .list_session_messages(&session_id)
            .await
            .expect("read succeeds");

        assert_eq!(
            rows.iter().map(|row| row.message.clone()).collect::<Vec<_>>(),
            vec![MessagePayload::human("Hi"), MessagePayload::ai("Hello!")]
        );

        let queries = captured.queries.lock().expect("query log lock").clone();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("session_id=eq.abc"));
        assert!(queries[0].contains("order=created_at.asc"));
        assert_eq!(
            captured.api_keys.lock().expect("header log lock").clone(),
            vec!["anon-key".to_string()]
        );
    }

    #[tokio::test]
    async fn error_statuses_surface_with_body() {
        let router = Router::new().route(
            "/rest/v1/messages",
            get(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base_url = serve(router).await;
        let table =
            RestMessageTable::new(RemoteTableConfig::new(base_url, "wrong")).expect("client builds");

        let error = table.list_messages().await.expect_err("401 must fail");
        match error {
            StorageError::HttpStatus { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

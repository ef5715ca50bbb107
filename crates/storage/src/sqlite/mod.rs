use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use snafu::{OptionExt, ResultExt};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::error::{
    CreateSqliteDirectorySnafu, DecodePayloadSnafu, EncodePayloadSnafu, InvalidTimestampSnafu,
    SqliteConnectOptionsSnafu, SqliteConnectSnafu, SqliteMigrateSnafu, SqliteQuerySnafu,
    StorageResult,
};
use super::feed::{FeedSubscription, feed_channel};
use super::ids::SessionId;
use super::types::{InsertEvent, MessagePayload, MessageRow, NewMessageRow};
use super::{BoxFuture, MessageFeed, MessageTable};

/// Buffered inserts per subscriber before a slow listener starts skipping rows.
const INSERT_BROADCAST_CAPACITY: usize = 256;

/// Local message table with the same row shape as the remote one.
///
/// Every committed insert is also broadcast to live subscriptions, so the table
/// serves as its own realtime feed.
#[derive(Debug, Clone)]
pub struct SqliteMessageTable {
    pool: SqlitePool,
    inserts: broadcast::Sender<MessageRow>,
}

impl SqliteMessageTable {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        // A single long-lived connection keeps `:memory:` databases alive for the pool's lifetime.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;

        tracing::info!(database_url = %database_url, "opened sqlite message table");

        let (inserts, _) = broadcast::channel(INSERT_BROADCAST_CAPACITY);
        Ok(Self { pool, inserts })
    }

    pub async fn in_memory() -> StorageResult<Self> {
        Self::open(":memory:").await
    }

    pub fn subscriber_count(&self) -> usize {
        self.inserts.receiver_count()
    }

    async fn fetch_rows(
        &self,
        session_id: Option<&SessionId>,
        stage: &'static str,
    ) -> StorageResult<Vec<MessageRow>> {
        let rows = match session_id {
            Some(session_id) => {
                sqlx::query_as::<_, StoredMessageRow>(
                    "SELECT session_id, message, created_at FROM messages WHERE session_id = ? ORDER BY created_at ASC, id ASC",
                )
                .bind(session_id.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, StoredMessageRow>(
                    "SELECT session_id, message, created_at FROM messages ORDER BY created_at ASC, id ASC",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context(SqliteQuerySnafu { stage })?;

        rows.into_iter().map(stored_row_to_message).collect()
    }

    async fn insert_row(&self, row: NewMessageRow) -> StorageResult<MessageRow> {
        let encoded = serde_json::to_string(&row.message).context(EncodePayloadSnafu {
            stage: "message-insert-encode",
        })?;
        let created_at = Utc::now();

        sqlx::query("INSERT INTO messages (session_id, message, created_at) VALUES (?, ?, ?)")
            .bind(row.session_id.as_str())
            .bind(encoded)
            .bind(created_at.timestamp_micros())
            .execute(&self.pool)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-insert",
            })?;

        let inserted = MessageRow {
            session_id: row.session_id,
            message: row.message,
            created_at,
        };

        // No live subscribers is the common case, not an error.
        let _ = self.inserts.send(inserted.clone());
        Ok(inserted)
    }

    fn open_subscription(&self) -> FeedSubscription {
        let mut inserts = self.inserts.subscribe();
        let (event_tx, subscription, mut cancel_rx) = feed_channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    received = inserts.recv() => match received {
                        Ok(row) => {
                            if event_tx.send(InsertEvent { row }).is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "sqlite feed subscriber lagged, inserts dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("sqlite feed subscription released");
        });

        subscription
    }
}

impl MessageTable for SqliteMessageTable {
    fn list_messages(&self) -> BoxFuture<'_, StorageResult<Vec<MessageRow>>> {
        Box::pin(self.fetch_rows(None, "message-list-all"))
    }

    fn list_session_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, StorageResult<Vec<MessageRow>>> {
        Box::pin(self.fetch_rows(Some(session_id), "message-list-session"))
    }

    fn insert_message(&self, row: NewMessageRow) -> BoxFuture<'_, StorageResult<MessageRow>> {
        Box::pin(self.insert_row(row))
    }
}

impl MessageFeed for SqliteMessageTable {
    fn subscribe(&self) -> BoxFuture<'_, StorageResult<FeedSubscription>> {
        Box::pin(async move { Ok(self.open_subscription()) })
    }
}

#[derive(Debug, FromRow)]
struct StoredMessageRow {
    session_id: String,
    message: String,
    created_at: i64,
}

fn stored_row_to_message(row: StoredMessageRow) -> StorageResult<MessageRow> {
    let message: MessagePayload =
        serde_json::from_str(&row.message).context(DecodePayloadSnafu {
            stage: "message-row-decode",
        })?;
    let created_at = DateTime::<Utc>::from_timestamp_micros(row.created_at).context(
        InvalidTimestampSnafu {
            stage: "message-row-created-at",
            value: row.created_at,
        },
    )?;

    Ok(MessageRow {
        session_id: SessionId::parse(&row.session_id)?,
        message,
        created_at,
    })
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") || database_location == ":memory:" {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    if database_location == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    format!("sqlite://{database_location}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;

    async fn seeded_table() -> SqliteMessageTable {
        let table = SqliteMessageTable::in_memory()
            .await
            .expect("in-memory table opens");
        let abc = SessionId::parse("abc").expect("valid id");
        let other = SessionId::parse("other").expect("valid id");

        for row in [
            NewMessageRow::new(abc.clone(), MessagePayload::human("Hi")),
            NewMessageRow::new(other.clone(), MessagePayload::human("Elsewhere")),
            NewMessageRow::new(abc, MessagePayload::ai("Hello!")),
        ] {
            table.insert_message(row).await.expect("insert succeeds");
        }
        table
    }

    #[tokio::test]
    async fn session_reads_are_filtered_and_ascending() {
        let table = seeded_table().await;
        let abc = SessionId::parse("abc").expect("valid id");

        let rows = table
            .list_session_messages(&abc)
            .await
            .expect("session read succeeds");
        let kinds = rows
            .iter()
            .map(|row| (row.message.kind, row.message.content.as_str()))
            .collect::<Vec<_>>();

        assert_eq!(
            kinds,
            vec![(MessageKind::Human, "Hi"), (MessageKind::Ai, "Hello!")]
        );
        assert!(rows.windows(2).all(|pair| pair[0].created_at <= pair[1].created_at));
    }

    #[tokio::test]
    async fn full_reads_keep_insertion_order_across_sessions() {
        let table = seeded_table().await;

        let contents = table
            .list_messages()
            .await
            .expect("full read succeeds")
            .into_iter()
            .map(|row| row.message.content)
            .collect::<Vec<_>>();

        assert_eq!(contents, vec!["Hi", "Elsewhere", "Hello!"]);
    }

    #[tokio::test]
    async fn subscriptions_observe_inserts_until_dropped() {
        let table = SqliteMessageTable::in_memory()
            .await
            .expect("in-memory table opens");
        let mut subscription = table.subscribe().await.expect("subscribe succeeds");
        assert_eq!(table.subscriber_count(), 1);

        let session_id = SessionId::new_v4();
        table
            .insert_message(NewMessageRow::new(
                session_id.clone(),
                MessagePayload::ai("pushed"),
            ))
            .await
            .expect("insert succeeds");

        let event = subscription.recv().await.expect("insert delivered");
        assert_eq!(event.row.session_id, session_id);
        assert_eq!(event.row.message, MessagePayload::ai("pushed"));

        drop(subscription);
        for _ in 0..50 {
            if table.subscriber_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(table.subscriber_count(), 0);
    }

    #[test]
    fn database_urls_are_normalized() {
        assert_eq!(normalize_database_url(":memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_database_url("sqlite://already.db"),
            "sqlite://already.db"
        );
        assert_eq!(
            normalize_database_url("data/messages.db"),
            "sqlite://data/messages.db"
        );
    }
}

use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod feed;
pub mod ids;
pub mod realtime;
pub mod rest;
pub mod sqlite;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use feed::{FeedSubscription, feed_channel};
pub use ids::SessionId;
pub use realtime::RealtimeFeed;
pub use rest::{RemoteTableConfig, RestMessageTable};
pub use sqlite::SqliteMessageTable;
pub use types::{
    DEFAULT_SCHEMA, DEFAULT_TABLE, InsertEvent, MessageKind, MessagePayload, MessageRow,
    NewMessageRow,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read/write access to the message table.
///
/// Reads always return rows ordered by creation time ascending.
pub trait MessageTable: Send + Sync {
    fn list_messages(&self) -> BoxFuture<'_, StorageResult<Vec<MessageRow>>>;
    fn list_session_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, StorageResult<Vec<MessageRow>>>;
    fn insert_message(&self, row: NewMessageRow) -> BoxFuture<'_, StorageResult<MessageRow>>;
}

/// Push-based notification of rows inserted into the message table.
pub trait MessageFeed: Send + Sync {
    fn subscribe(&self) -> BoxFuture<'_, StorageResult<FeedSubscription>>;
}

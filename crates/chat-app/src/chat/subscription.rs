use std::future::pending;

use tern_storage::{FeedSubscription, InsertEvent, SessionId};

/// What the live subscription produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedDelivery {
    Insert(InsertEvent),
    /// The feed stopped delivering for this session.
    Ended(SessionId),
}

struct LiveSubscription {
    session_id: SessionId,
    feed: FeedSubscription,
}

/// Holds the single feed subscription scoped to the active session.
///
/// Installing a new subscription releases the previous one first, so at most one
/// listener is ever live.
#[derive(Default)]
pub struct SessionSubscription {
    live: Option<LiveSubscription>,
}

impl SessionSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.live.as_ref().map(|live| &live.session_id)
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn install(&mut self, session_id: SessionId, feed: FeedSubscription) {
        self.release();
        tracing::debug!(session_id = %session_id, "feed subscription installed");
        self.live = Some(LiveSubscription { session_id, feed });
    }

    pub fn release(&mut self) -> Option<SessionId> {
        let mut live = self.live.take()?;
        live.feed.close();
        tracing::debug!(session_id = %live.session_id, "feed subscription released");
        Some(live.session_id)
    }

    /// Waits for the next delivery; never resolves while no subscription is live.
    pub async fn recv(&mut self) -> FeedDelivery {
        let Some(live) = self.live.as_mut() else {
            return pending().await;
        };

        match live.feed.recv().await {
            Some(event) => FeedDelivery::Insert(event),
            None => FeedDelivery::Ended(live.session_id.clone()),
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

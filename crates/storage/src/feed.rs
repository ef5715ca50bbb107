use tokio::sync::{mpsc, oneshot};

use super::types::InsertEvent;

/// Handle to one live insert-event subscription.
///
/// Dropping the handle (or calling [`FeedSubscription::close`]) signals the backing
/// worker to unsubscribe, so holding at most one handle means at most one listener.
pub struct FeedSubscription {
    events: mpsc::UnboundedReceiver<InsertEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl FeedSubscription {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<InsertEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    /// Waits for the next insert. `None` means the worker has stopped delivering.
    pub async fn recv(&mut self) -> Option<InsertEvent> {
        self.events.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.cancel_tx.is_none()
    }

    pub fn close(&mut self) -> bool {
        self.events.close();
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FeedSubscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builds the channel triple a feed worker needs: the event sender it writes to,
/// the subscription handed to the caller, and the receiver that fires on unsubscribe.
pub fn feed_channel() -> (
    mpsc::UnboundedSender<InsertEvent>,
    FeedSubscription,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        FeedSubscription::new(event_rx, cancel_tx),
        cancel_rx,
    )
}

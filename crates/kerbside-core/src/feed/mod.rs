//! Changefeed transport abstraction.
//!
//! A [`Subscription`] is a cancellable stream of [`FeedMessage`]s. The
//! transport's teardown hook runs exactly once: on [`Subscription::cancel`]
//! or, failing that, when the subscription is dropped.

mod polling;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::ChangeEvent;

pub use polling::{diff_snapshots, PollingChangeFeed};

/// One delivery from a transport; an `Err` means the feed has dropped.
pub type FeedMessage = Result<ChangeEvent>;

type CancelHook = Box<dyn FnOnce() + Send + 'static>;

/// Opens subscriptions on a table.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, table: &str) -> Result<Subscription>;
}

pub struct Subscription {
    table: String,
    events: mpsc::UnboundedReceiver<FeedMessage>,
    on_cancel: Option<CancelHook>,
}

impl Subscription {
    pub fn new(
        table: impl Into<String>,
        events: mpsc::UnboundedReceiver<FeedMessage>,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            table: table.into(),
            events,
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Next delivery in arrival order; `None` once the transport has closed.
    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.events.recv().await
    }

    /// Stop delivery and release the transport.
    pub fn cancel(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.events.close();
        if let Some(on_cancel) = self.on_cancel.take() {
            tracing::debug!("Cancelling changefeed subscription on {}", self.table);
            on_cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("table", &self.table)
            .field("cancelled", &self.on_cancel.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::models::Record;

    #[test]
    fn cancel_runs_teardown_exactly_once() {
        let cancellations = Arc::new(AtomicUsize::new(0));
        let counter = cancellations.clone();
        let (_sender, receiver) = mpsc::unbounded_channel();
        let subscription = Subscription::new("parking_restrictions", receiver, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscription.cancel();

        assert_eq!(cancellations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_without_cancel_still_tears_down() {
        let cancellations = Arc::new(AtomicUsize::new(0));
        let counter = cancellations.clone();
        let (_sender, receiver) = mpsc::unbounded_channel();
        drop(Subscription::new("parking_restrictions", receiver, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(cancellations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn events_arrive_in_send_order() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subscription = Subscription::new("parking_restrictions", receiver, || {});

        sender.send(Ok(ChangeEvent::created(Record::pending(1, 0.0, 0.0)))).unwrap();
        sender.send(Ok(ChangeEvent::deleted(1))).unwrap();
        drop(sender);

        let first = subscription.next().await.unwrap().unwrap();
        let second = subscription.next().await.unwrap().unwrap();
        assert_eq!(first, ChangeEvent::created(Record::pending(1, 0.0, 0.0)));
        assert_eq!(second, ChangeEvent::deleted(1));
        assert!(subscription.next().await.is_none());
    }
}

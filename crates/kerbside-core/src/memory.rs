//! In-process record table with a live changefeed.
//!
//! Writes through [`RecordService`] echo back to subscribers as change
//! events, the same way the hosted table's changefeed does. Test hooks can
//! inject failures, raw events, and transport drops.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::feed::{ChangeFeed, FeedMessage, Subscription};
use crate::models::{ChangeEvent, Record, RecordId, RecordPatch};
use crate::services::RecordService;
use crate::store::RecordMap;

#[derive(Default)]
struct MemoryState {
    rows: RecordMap,
    subscribers: Vec<(u64, mpsc::UnboundedSender<FeedMessage>)>,
    next_subscription: u64,
    opened: usize,
    cancelled: usize,
    full_reads: usize,
    fail_reads: bool,
    fail_writes: bool,
    fail_subscribe: bool,
}

impl MemoryState {
    fn broadcast(&mut self, event: &ChangeEvent) {
        self.subscribers
            .retain(|(_, sender)| sender.send(Ok(event.clone())).is_ok());
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let backend = Self::new();
        {
            let mut state = backend.lock();
            for record in records {
                state.rows.insert(record.id.clone(), record);
            }
        }
        backend
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// A row inserted by another session.
    pub fn insert_external(&self, record: Record) {
        let mut state = self.lock();
        state.rows.insert(record.id.clone(), record.clone());
        state.broadcast(&ChangeEvent::created(record));
    }

    /// A row replaced by another session.
    pub fn update_external(&self, record: Record) {
        let mut state = self.lock();
        state.rows.insert(record.id.clone(), record.clone());
        state.broadcast(&ChangeEvent::updated(record));
    }

    /// A row removed by another session.
    pub fn delete_external(&self, id: &RecordId) {
        let mut state = self.lock();
        if state.rows.remove(id).is_some() {
            state.broadcast(&ChangeEvent::deleted(id.clone()));
        }
    }

    /// Deliver an event without touching the rows (duplicates, reordering).
    pub fn emit(&self, event: &ChangeEvent) {
        self.lock().broadcast(event);
    }

    /// Drop every live subscription with a transport error.
    pub fn disconnect_all(&self) {
        let mut state = self.lock();
        for (_, sender) in state.subscribers.drain(..) {
            let _ = sender.send(Err(Error::Subscription("connection reset".to_string())));
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.lock().fail_subscribe = fail;
    }

    pub fn rows(&self) -> Vec<Record> {
        self.lock().rows.values().cloned().collect()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|(_, sender)| !sender.is_closed())
            .count()
    }

    pub fn subscriptions_opened(&self) -> usize {
        self.lock().opened
    }

    pub fn subscriptions_cancelled(&self) -> usize {
        self.lock().cancelled
    }

    /// Calls to `select_all`, failed ones included.
    pub fn full_reads(&self) -> usize {
        self.lock().full_reads
    }
}

#[async_trait]
impl RecordService for MemoryBackend {
    async fn select_all(&self) -> Result<Vec<Record>> {
        let mut state = self.lock();
        state.full_reads += 1;
        if state.fail_reads {
            return Err(Error::Api("records table unavailable (503)".to_string()));
        }
        Ok(state.rows.values().cloned().collect())
    }

    async fn select_pending(&self) -> Result<Vec<Record>> {
        let state = self.lock();
        if state.fail_reads {
            return Err(Error::Api("records table unavailable (503)".to_string()));
        }
        Ok(state
            .rows
            .values()
            .filter(|record| record.is_pending())
            .cloned()
            .collect())
    }

    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<()> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(Error::Api("permission denied (403)".to_string()));
        }
        let Some(current) = state.rows.get(id) else {
            return Ok(());
        };
        let updated = patch.apply_to(current)?;
        state.rows.insert(id.clone(), updated.clone());
        state.broadcast(&ChangeEvent::updated(updated));
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(Error::Api("permission denied (403)".to_string()));
        }
        if state.rows.remove(id).is_some() {
            state.broadcast(&ChangeEvent::deleted(id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, table: &str) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription_id = {
            let mut state = self.lock();
            if state.fail_subscribe {
                return Err(Error::Subscription("changefeed unavailable".to_string()));
            }
            let subscription_id = state.next_subscription;
            state.next_subscription += 1;
            state.opened += 1;
            state.subscribers.push((subscription_id, sender));
            subscription_id
        };

        let state = Arc::downgrade(&self.state);
        Ok(Subscription::new(table, receiver, move || {
            if let Some(state) = state.upgrade() {
                let mut state = state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                state.cancelled += 1;
                state
                    .subscribers
                    .retain(|(existing, _)| *existing != subscription_id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{FieldEdits, RecordStatus};

    #[tokio::test(flavor = "current_thread")]
    async fn writes_echo_to_subscribers() {
        let backend = MemoryBackend::with_records([Record::pending(1, 0.0, 0.0)]);
        let mut subscription = backend.subscribe("parking_restrictions").await.unwrap();

        let patch = RecordPatch::approval(&FieldEdits::new(), chrono::Utc::now());
        backend.update(&RecordId::Int(1), &patch).await.unwrap();
        backend.delete(&RecordId::Int(1)).await.unwrap();

        let ChangeEvent::Updated { after, .. } = subscription.next().await.unwrap().unwrap() else {
            panic!("expected an update echo");
        };
        assert_eq!(after.status, RecordStatus::Approved);
        assert_eq!(
            subscription.next().await.unwrap().unwrap(),
            ChangeEvent::deleted(1)
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cancelled_subscription_is_unregistered() {
        let backend = MemoryBackend::new();
        let subscription = backend.subscribe("parking_restrictions").await.unwrap();
        assert_eq!(backend.active_subscriptions(), 1);

        subscription.cancel();

        assert_eq!(backend.active_subscriptions(), 0);
        assert_eq!(backend.subscriptions_opened(), 1);
        assert_eq!(backend.subscriptions_cancelled(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_write_leaves_rows_untouched() {
        let backend = MemoryBackend::with_records([Record::pending(1, 0.0, 0.0)]);
        backend.set_fail_writes(true);

        assert!(backend.delete(&RecordId::Int(1)).await.is_err());
        assert_eq!(backend.rows().len(), 1);
    }
}

//! Changefeed derived by polling the record service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::{ChangeFeed, FeedMessage, Subscription};
use crate::error::{Error, Result};
use crate::models::ChangeEvent;
use crate::services::RecordService;
use crate::store::{RecordMap, RecordSnapshot};

/// Emits `created`/`updated`/`deleted` events by diffing successive
/// `select_all` reads. The first read is the baseline and emits nothing; a
/// failed read ends the subscription with an error.
pub struct PollingChangeFeed {
    source: Arc<dyn RecordService>,
    interval: Duration,
}

impl PollingChangeFeed {
    pub fn new(source: Arc<dyn RecordService>, interval: Duration) -> Self {
        Self { source, interval }
    }
}

#[async_trait]
impl ChangeFeed for PollingChangeFeed {
    async fn subscribe(&self, table: &str) -> Result<Subscription> {
        let baseline = self
            .source
            .select_all()
            .await
            .map_err(|error| Error::Subscription(error.to_string()))?;
        let baseline = RecordSnapshot::from_records(baseline).all().clone();

        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(poll(
            self.source.clone(),
            self.interval,
            baseline,
            sender,
        ));
        tracing::info!(
            "Polling changefeed on {} every {:?}",
            table,
            self.interval
        );
        Ok(Subscription::new(table, receiver, move || task.abort()))
    }
}

async fn poll(
    source: Arc<dyn RecordService>,
    every: Duration,
    mut previous: RecordMap,
    sender: mpsc::UnboundedSender<FeedMessage>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let rows = match source.select_all().await {
            Ok(rows) => rows,
            Err(error) => {
                let _ = sender.send(Err(Error::Subscription(format!("poll failed: {error}"))));
                return;
            }
        };

        let current = RecordSnapshot::from_records(rows).all().clone();
        for event in diff_snapshots(&previous, &current) {
            if sender.send(Ok(event)).is_err() {
                return;
            }
        }
        previous = current;
    }
}

/// Events that turn `previous` into `current`: deletions first, then
/// creations and updates in id order.
pub fn diff_snapshots(previous: &RecordMap, current: &RecordMap) -> Vec<ChangeEvent> {
    let deleted = previous
        .keys()
        .filter(|id| !current.contains_key(*id))
        .map(|id| ChangeEvent::deleted(id.clone()));

    let upserted = current.values().filter_map(|record| match previous.get(&record.id) {
        None => Some(ChangeEvent::created(record.clone())),
        Some(old) if old != record => Some(ChangeEvent::updated(record.clone())),
        Some(_) => None,
    });

    deleted.chain(upserted).collect()
}

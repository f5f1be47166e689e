//! Sync controller: bulk load, changefeed subscription, and write actions.
//!
//! The controller follows the session role. When the role turns `Admin` it
//! bulk-loads the records table, opens a changefeed subscription, and feeds
//! every delivered event through [`reduce`] into the [`RecordStore`]. It is
//! the store's only writer; approve and delete go straight to the record
//! service and reach the store through the changefeed echo.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::config::{DashboardConfig, DEFAULT_RECORDS_TABLE};
use crate::error::{Error, Result};
use crate::feed::{ChangeFeed, Subscription};
use crate::models::{ChangeEvent, FieldEdits, Record, RecordId, RecordPatch, SessionRole};
use crate::reducer::reduce;
use crate::services::{BulkRecordSource, RecordService};
use crate::state::SyncState;
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub table: String,
    pub resubscribe_backoff: Duration,
    pub resubscribe_max_backoff: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            table: DEFAULT_RECORDS_TABLE.to_string(),
            resubscribe_backoff: Duration::from_secs(1),
            resubscribe_max_backoff: Duration::from_secs(30),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            table: config.records_table.clone(),
            resubscribe_backoff: config.resubscribe_backoff,
            resubscribe_max_backoff: config.resubscribe_max_backoff,
        }
    }
}

/// Collaborators the controller reads from and writes to.
#[derive(Clone)]
pub struct SyncDeps {
    pub records: Arc<dyn RecordService>,
    pub feed: Arc<dyn ChangeFeed>,
    /// Replaces `records.select_all()` during bulk load when set.
    pub bulk: Option<Arc<dyn BulkRecordSource>>,
}

struct Shared {
    state: watch::Sender<SyncState>,
    last_error: Mutex<Option<String>>,
    reload: Notify,
    store: RecordStore,
    records: Arc<dyn RecordService>,
}

impl Shared {
    fn set_state(&self, next: SyncState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::info!("Sync state: {} -> {}", current, next);
            *current = next;
            true
        });
    }

    fn fail(&self, error: &Error) {
        tracing::warn!("Record sync failed: {}", error);
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
        self.set_state(SyncState::Error);
    }

    /// Drop a reload permit left by a request the engine was not waiting on.
    fn discard_stale_reload(&self) {
        let stale = self.reload.notified();
        tokio::pin!(stale);
        if stale.as_mut().enable() {
            tracing::debug!("Discarded stale reload request");
        }
    }

    fn activate(&self) {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.set_state(SyncState::Active);
    }
}

pub struct SyncController {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl SyncController {
    /// Start following `role`. The returned controller owns a background task
    /// that stops on [`Self::shutdown`], on drop, or when the role source closes.
    pub fn spawn(
        deps: SyncDeps,
        settings: SyncSettings,
        store: RecordStore,
        role: watch::Receiver<SessionRole>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Inactive);
        let shared = Arc::new(Shared {
            state,
            last_error: Mutex::new(None),
            reload: Notify::new(),
            store,
            records: deps.records.clone(),
        });
        let engine = Engine {
            shared: shared.clone(),
            deps,
            settings,
        };
        let task = tokio::spawn(engine.run(role));
        Self { shared, task }
    }

    pub fn state(&self) -> SyncState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.shared.state.subscribe()
    }

    /// Message of the most recent load or changefeed failure, cleared once
    /// the controller is active again.
    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self) -> &RecordStore {
        &self.shared.store
    }

    /// Ask for a fresh bulk load. Retries a failed load; while active the
    /// changefeed stays open and events arriving meanwhile apply afterwards.
    /// Ignored while inactive or loading.
    pub fn reload(&self) {
        match self.state() {
            SyncState::Active | SyncState::Error => self.shared.reload.notify_one(),
            state => tracing::debug!("Ignoring reload request while {}", state),
        }
    }

    /// Write `edits` plus the approval columns to record `id`.
    pub async fn approve(&self, id: &RecordId, edits: &FieldEdits) -> Result<()> {
        self.ensure_active()?;
        let patch = RecordPatch::approval(edits, Utc::now());
        self.shared
            .records
            .update(id, &patch)
            .await
            .map_err(|error| Error::write(id, &error))?;
        tracing::info!("Approved record {} ({} edited fields)", id, edits.iter().count());
        Ok(())
    }

    pub async fn delete(&self, id: &RecordId) -> Result<()> {
        self.ensure_active()?;
        self.shared
            .records
            .delete(id)
            .await
            .map_err(|error| Error::write(id, &error))?;
        tracing::info!("Deleted record {}", id);
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state().is_active() {
            Ok(())
        } else {
            Err(Error::NotActive)
        }
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Why an admin session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    RoleLost,
    RoleSourceClosed,
}

enum PumpExit {
    Ended(SessionEnd),
    Dropped(Error),
    ReloadFailed(Error),
}

struct Engine {
    shared: Arc<Shared>,
    deps: SyncDeps,
    settings: SyncSettings,
}

impl Engine {
    async fn run(self, mut role: watch::Receiver<SessionRole>) {
        loop {
            if role.wait_for(|current| current.is_admin()).await.is_err() {
                break;
            }
            let end = self.run_session(&mut role).await;
            self.shared.store.clear();
            self.shared.set_state(SyncState::Inactive);
            if end == SessionEnd::RoleSourceClosed {
                break;
            }
        }
        tracing::debug!("Session role source closed; sync controller stopping");
    }

    async fn run_session(&self, role: &mut watch::Receiver<SessionRole>) -> SessionEnd {
        self.shared.discard_stale_reload();
        if let Err(end) = self.initial_load(role).await {
            return end;
        }

        let mut backoff = self.settings.resubscribe_backoff;
        let mut resync = false;
        loop {
            let opened = self
                .open_subscription(role, &mut backoff, &mut resync)
                .await;
            let mut subscription = match opened {
                Ok(subscription) => subscription,
                Err(end) => return end,
            };

            if resync {
                let loaded = tokio::select! {
                    biased;
                    closed = role_lost(role) => {
                        subscription.cancel();
                        return session_end(closed);
                    }
                    loaded = self.bulk_load() => loaded,
                };
                match loaded {
                    Ok(records) => self.shared.store.replace_all(records),
                    Err(error) => {
                        subscription.cancel();
                        self.shared.fail(&error);
                        if let Some(end) = self.back_off(role, &mut backoff).await {
                            return end;
                        }
                        continue;
                    }
                }
            }

            // The load just issued covers any reload requested meanwhile.
            self.shared.discard_stale_reload();
            self.shared.activate();
            backoff = self.settings.resubscribe_backoff;

            let exit = self.pump(&mut subscription, role).await;
            subscription.cancel();
            match exit {
                PumpExit::Ended(end) => return end,
                PumpExit::Dropped(error) => {
                    self.shared.fail(&error);
                    if let Some(end) = self.back_off(role, &mut backoff).await {
                        return end;
                    }
                }
                PumpExit::ReloadFailed(error) => {
                    self.shared.fail(&error);
                    if let Err(end) = self.wait_for_reload(role).await {
                        return end;
                    }
                }
            }
            resync = true;
        }
    }

    /// Bulk load until it succeeds. A failure parks in `Error` until
    /// [`SyncController::reload`] or a role change.
    async fn initial_load(&self, role: &mut watch::Receiver<SessionRole>) -> std::result::Result<(), SessionEnd> {
        loop {
            self.shared.set_state(SyncState::Loading);
            let loaded = tokio::select! {
                biased;
                closed = role_lost(role) => return Err(session_end(closed)),
                loaded = self.bulk_load() => loaded,
            };
            match loaded {
                Ok(records) => {
                    self.shared.store.replace_all(records);
                    return Ok(());
                }
                Err(error) => {
                    self.shared.fail(&error);
                    self.wait_for_reload(role).await?;
                }
            }
        }
    }

    async fn wait_for_reload(&self, role: &mut watch::Receiver<SessionRole>) -> std::result::Result<(), SessionEnd> {
        tokio::select! {
            biased;
            closed = role_lost(role) => Err(session_end(closed)),
            () = self.shared.reload.notified() => Ok(()),
        }
    }

    /// All records merged with the pending read; the pending read wins per id.
    async fn bulk_load(&self) -> Result<Vec<Record>> {
        let all = async {
            match &self.deps.bulk {
                Some(bulk) => bulk.fetch_all().await,
                None => self.deps.records.select_all().await,
            }
        };
        let (all, pending) = tokio::try_join!(all, self.deps.records.select_pending())
            .map_err(|error| Error::BulkLoad(error.to_string()))?;
        tracing::info!(
            "Bulk loaded {} records ({} pending)",
            all.len(),
            pending.len()
        );
        Ok(all.into_iter().chain(pending).collect())
    }

    /// Subscribe, backing off between failures. Any failure sets `resync`,
    /// since rows changed while the feed was down never arrive as events.
    async fn open_subscription(
        &self,
        role: &mut watch::Receiver<SessionRole>,
        backoff: &mut Duration,
        resync: &mut bool,
    ) -> std::result::Result<Subscription, SessionEnd> {
        loop {
            let opened = tokio::select! {
                biased;
                closed = role_lost(role) => return Err(session_end(closed)),
                opened = self.deps.feed.subscribe(&self.settings.table) => opened,
            };
            match opened {
                Ok(subscription) => {
                    tracing::info!("Subscribed to changefeed on {}", subscription.table());
                    return Ok(subscription);
                }
                Err(error) => {
                    *resync = true;
                    self.shared.fail(&error);
                    if let Some(end) = self.back_off(role, backoff).await {
                        return Err(end);
                    }
                }
            }
        }
    }

    async fn pump(
        &self,
        subscription: &mut Subscription,
        role: &mut watch::Receiver<SessionRole>,
    ) -> PumpExit {
        loop {
            tokio::select! {
                biased;
                closed = role_lost(role) => return PumpExit::Ended(session_end(closed)),
                () = self.shared.reload.notified() => {
                    let loaded = tokio::select! {
                        biased;
                        closed = role_lost(role) => return PumpExit::Ended(session_end(closed)),
                        loaded = self.bulk_load() => loaded,
                    };
                    match loaded {
                        Ok(records) => self.shared.store.replace_all(records),
                        Err(error) => return PumpExit::ReloadFailed(error),
                    }
                }
                message = subscription.next() => match message {
                    Some(Ok(event)) => self.apply(&event),
                    Some(Err(error)) => return PumpExit::Dropped(error),
                    None => {
                        return PumpExit::Dropped(Error::Subscription(
                            "changefeed closed".to_string(),
                        ));
                    }
                },
            }
        }
    }

    fn apply(&self, event: &ChangeEvent) {
        let current = self.shared.store.snapshot();
        let next = reduce(event, current.all());
        tracing::debug!(
            "Applied {} event for record {} ({} records, {} pending)",
            event.kind(),
            event.record_id(),
            next.len(),
            next.pending_records().len()
        );
        self.shared.store.apply_reducer_result(next);
    }

    /// Sleep for the current backoff, doubling it up to the configured cap.
    async fn back_off(
        &self,
        role: &mut watch::Receiver<SessionRole>,
        backoff: &mut Duration,
    ) -> Option<SessionEnd> {
        let delay = *backoff;
        *backoff = (*backoff * 2).min(self.settings.resubscribe_max_backoff);
        tracing::info!("Retrying changefeed in {:?}", delay);
        tokio::select! {
            biased;
            closed = role_lost(role) => Some(session_end(closed)),
            () = tokio::time::sleep(delay) => None,
        }
    }
}

/// Resolves once the role is no longer `Admin`; `true` if the role source
/// closed instead.
async fn role_lost(role: &mut watch::Receiver<SessionRole>) -> bool {
    role.wait_for(|current| !current.is_admin()).await.is_err()
}

const fn session_end(closed: bool) -> SessionEnd {
    if closed {
        SessionEnd::RoleSourceClosed
    } else {
        SessionEnd::RoleLost
    }
}

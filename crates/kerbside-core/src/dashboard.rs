//! Dashboard facade over the session gate and sync controller.
//!
//! This is the surface a front end renders from: read-only record views,
//! the current role and sync state, per-record approval drafts, and the
//! approve/delete actions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::auth::{IdentityProvider, SessionPersistence, SupabaseIdentity};
use crate::config::DashboardConfig;
use crate::error::{Error, Result};
use crate::feed::PollingChangeFeed;
use crate::gate::SessionGate;
use crate::models::{EditableField, FieldEdits, Record, RecordId, SessionRole};
use crate::services::{BulkDataClient, BulkRecordSource, PostgrestRecordClient, RecordService};
use crate::state::SyncState;
use crate::store::{MapMarker, RecordSnapshot, RecordStore, DEFAULT_MAP_CENTER};
use crate::sync::{SyncController, SyncDeps, SyncSettings};

#[derive(Debug, Default)]
struct LocalState {
    drafts: HashMap<RecordId, FieldEdits>,
    selected: Option<RecordId>,
}

pub struct Dashboard {
    gate: SessionGate,
    sync: SyncController,
    local: Mutex<LocalState>,
}

impl Dashboard {
    pub fn start(identity: Arc<dyn IdentityProvider>, deps: SyncDeps, settings: SyncSettings) -> Self {
        let gate = SessionGate::spawn(identity);
        let sync = SyncController::spawn(deps, settings, RecordStore::new(), gate.subscribe());
        Self {
            gate,
            sync,
            local: Mutex::new(LocalState::default()),
        }
    }

    /// Wire a dashboard to a Supabase project: PostgREST for reads and
    /// writes, a polling changefeed, and the bulk endpoint when configured.
    pub fn connect<S: SessionPersistence>(
        config: &DashboardConfig,
        identity: SupabaseIdentity<S>,
    ) -> Result<Self> {
        let session = identity.auth().auth_state();
        let records: Arc<dyn RecordService> =
            Arc::new(PostgrestRecordClient::from_config(config, session.clone())?);
        let feed = Arc::new(PollingChangeFeed::new(
            records.clone(),
            config.feed_poll_interval,
        ));
        let bulk = match config.bulk_data_url.as_deref() {
            Some(endpoint) => Some(Arc::new(BulkDataClient::new(endpoint, config, session)?)
                as Arc<dyn BulkRecordSource>),
            None => None,
        };

        Ok(Self::start(
            Arc::new(identity),
            SyncDeps {
                records,
                feed,
                bulk,
            },
            SyncSettings::from_config(config),
        ))
    }

    pub fn role(&self) -> SessionRole {
        self.gate.role()
    }

    pub fn role_changes(&self) -> watch::Receiver<SessionRole> {
        self.gate.subscribe()
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn sync_state_changes(&self) -> watch::Receiver<SyncState> {
        self.sync.subscribe_state()
    }

    pub fn last_error(&self) -> Option<String> {
        self.sync.last_error()
    }

    pub fn snapshot(&self) -> Arc<RecordSnapshot> {
        self.sync.store().snapshot()
    }

    pub fn record_changes(&self) -> watch::Receiver<Arc<RecordSnapshot>> {
        self.sync.store().subscribe()
    }

    pub fn all_records(&self) -> Vec<Record> {
        self.snapshot().all_records().cloned().collect()
    }

    pub fn pending_records(&self) -> Vec<Record> {
        self.snapshot().pending_records().to_vec()
    }

    pub fn pending_matching_postcode(&self, filter: &str) -> Vec<Record> {
        self.snapshot()
            .pending_matching_postcode(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn markers(&self) -> Vec<MapMarker> {
        self.snapshot().markers()
    }

    /// Wait until records are live.
    ///
    /// Fails with [`Error::AccessDenied`] once the principal resolves to a
    /// non-admin, or with [`Error::Sync`] if loading fails.
    pub async fn ready(&self) -> Result<()> {
        let mut role = self.gate.subscribe();
        let mut state = self.sync.subscribe_state();
        loop {
            let current_role = *role.borrow_and_update();
            let current_state = *state.borrow_and_update();
            match (current_role, current_state) {
                (_, SyncState::Active) => return Ok(()),
                (SessionRole::None, _) => return Err(Error::AccessDenied),
                (SessionRole::Admin, SyncState::Error) => {
                    let message = self
                        .last_error()
                        .unwrap_or_else(|| "unknown failure".to_string());
                    return Err(Error::Sync(message));
                }
                _ => {}
            }

            tokio::select! {
                changed = role.changed() => {
                    if changed.is_err() {
                        return Err(Error::AccessDenied);
                    }
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        return Err(Error::Sync("sync controller stopped".to_string()));
                    }
                }
            }
        }
    }

    pub fn reload(&self) {
        self.sync.reload();
    }

    fn local(&self) -> MutexGuard<'_, LocalState> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stage an edit to be sent with the next approval of `id`.
    pub fn edit_field(&self, id: &RecordId, field: EditableField, value: impl Into<String>) {
        self.local()
            .drafts
            .entry(id.clone())
            .or_default()
            .set(field, value);
    }

    pub fn draft(&self, id: &RecordId) -> Option<FieldEdits> {
        self.local().drafts.get(id).cloned()
    }

    pub fn discard_draft(&self, id: &RecordId) {
        self.local().drafts.remove(id);
    }

    /// Value to show for `field`: the staged edit if there is one, else the
    /// record's current value.
    pub fn field_value(&self, id: &RecordId, field: EditableField) -> Option<String> {
        if let Some(value) = self
            .local()
            .drafts
            .get(id)
            .and_then(|draft| draft.get(field))
        {
            return Some(value.to_string());
        }
        self.snapshot()
            .get(id)
            .and_then(|record| record.fields.get(field))
            .map(str::to_string)
    }

    /// Select a record on the map; returns its coordinates when known.
    pub fn select(&self, id: &RecordId) -> Option<(f64, f64)> {
        let position = self
            .snapshot()
            .get(id)
            .map(|record| (record.latitude, record.longitude));
        self.local().selected = Some(id.clone());
        position
    }

    pub fn selected(&self) -> Option<RecordId> {
        self.local().selected.clone()
    }

    /// Selected record's position, or central London.
    pub fn map_center(&self) -> (f64, f64) {
        let Some(selected) = self.selected() else {
            return DEFAULT_MAP_CENTER;
        };
        self.snapshot()
            .get(&selected)
            .map_or(DEFAULT_MAP_CENTER, |record| (record.latitude, record.longitude))
    }

    /// Approve `id` with its staged draft. On success the draft is dropped
    /// and the record deselected.
    pub async fn approve(&self, id: &RecordId) -> Result<()> {
        let edits = self.draft(id).unwrap_or_default();
        self.sync.approve(id, &edits).await?;
        self.forget(id);
        Ok(())
    }

    /// Approve `id` with explicit edits, ignoring any staged draft.
    pub async fn approve_with(&self, id: &RecordId, edits: &FieldEdits) -> Result<()> {
        self.sync.approve(id, edits).await?;
        self.forget(id);
        Ok(())
    }

    pub async fn delete(&self, id: &RecordId) -> Result<()> {
        self.sync.delete(id).await?;
        self.forget(id);
        Ok(())
    }

    fn forget(&self, id: &RecordId) {
        let mut local = self.local();
        local.drafts.remove(id);
        if local.selected.as_ref() == Some(id) {
            local.selected = None;
        }
    }

    pub fn shutdown(self) {
        self.sync.shutdown();
        self.gate.shutdown();
    }
}

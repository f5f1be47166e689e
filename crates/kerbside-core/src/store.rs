//! Local record store.
//!
//! The store publishes immutable [`RecordSnapshot`]s through a `watch`
//! channel. Each snapshot carries both the canonical record map and the
//! pending view derived from it, so a reader always sees a matching pair and
//! a swap is a single pointer replacement.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{Record, RecordId};

/// Canonical records keyed by id.
pub type RecordMap = BTreeMap<RecordId, Record>;

/// Default map centre (central London) used before any record is selected.
pub const DEFAULT_MAP_CENTER: (f64, f64) = (51.5074, -0.1278);

/// A map pin for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub id: RecordId,
    pub latitude: f64,
    pub longitude: f64,
}

/// Consistent view of all records plus the pending subset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSnapshot {
    all: RecordMap,
    pending: Vec<Record>,
}

impl RecordSnapshot {
    /// Build a snapshot from the canonical map, deriving the pending view.
    pub fn from_map(all: RecordMap) -> Self {
        let pending = all
            .values()
            .filter(|record| record.is_pending())
            .cloned()
            .collect();
        Self { all, pending }
    }

    /// Build a snapshot from a record list; later duplicates of an id win.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let all = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self::from_map(all)
    }

    pub const fn all(&self) -> &RecordMap {
        &self.all
    }

    pub fn all_records(&self) -> impl Iterator<Item = &Record> {
        self.all.values()
    }

    pub fn pending_records(&self) -> &[Record] {
        &self.pending
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.all.get(id)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Pending records whose postcode contains `filter`, case-insensitively.
    ///
    /// An empty filter returns the whole pending queue.
    pub fn pending_matching_postcode(&self, filter: &str) -> Vec<&Record> {
        let needle = filter.trim().to_lowercase();
        self.pending
            .iter()
            .filter(|record| {
                needle.is_empty()
                    || record
                        .fields
                        .postcode
                        .as_deref()
                        .is_some_and(|postcode| postcode.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn markers(&self) -> Vec<MapMarker> {
        self.all
            .values()
            .map(|record| MapMarker {
                id: record.id.clone(),
                latitude: record.latitude,
                longitude: record.longitude,
            })
            .collect()
    }
}

/// Holder of the current snapshot.
///
/// Only the sync controller writes; everyone else reads via [`Self::snapshot`]
/// or [`Self::subscribe`].
#[derive(Debug, Clone)]
pub struct RecordStore {
    sender: Arc<watch::Sender<Arc<RecordSnapshot>>>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(RecordSnapshot::default()));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<RecordSnapshot> {
        self.sender.borrow().clone()
    }

    /// Receive every snapshot swap.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RecordSnapshot>> {
        self.sender.subscribe()
    }

    /// Replace everything with a bulk-loaded record set.
    pub fn replace_all(&self, records: impl IntoIterator<Item = Record>) {
        self.apply_reducer_result(RecordSnapshot::from_records(records));
    }

    /// Swap in a snapshot produced by the reducer.
    pub fn apply_reducer_result(&self, snapshot: RecordSnapshot) {
        self.sender.send_replace(Arc::new(snapshot));
    }

    pub fn clear(&self) {
        self.apply_reducer_result(RecordSnapshot::default());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::EditableField;

    #[test]
    fn replace_all_derives_pending_view() {
        let store = RecordStore::new();
        store.replace_all([
            Record::pending(1, 51.5, -0.1),
            Record::pending(2, 51.6, -0.2).approved(chrono::Utc::now()),
        ]);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.pending_records().len(), 1);
        assert_eq!(snapshot.pending_records()[0].id, RecordId::Int(1));
    }

    #[test]
    fn later_duplicates_win_in_bulk_load() {
        let snapshot = RecordSnapshot::from_records([
            Record::pending(1, 0.0, 0.0),
            Record::pending(1, 0.0, 0.0).approved(chrono::Utc::now()),
        ]);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.pending_records().is_empty());
    }

    #[test]
    fn readers_keep_their_snapshot_across_swaps() {
        let store = RecordStore::new();
        store.replace_all([Record::pending(1, 0.0, 0.0)]);
        let before = store.snapshot();

        store.clear();

        assert_eq!(before.len(), 1);
        assert_eq!(before.pending_records().len(), 1);
        assert!(store.snapshot().is_empty());
        assert!(store.snapshot().pending_records().is_empty());
    }

    #[test]
    fn subscribers_observe_each_swap() {
        let store = RecordStore::new();
        let mut receiver = store.subscribe();

        store.replace_all([Record::pending(1, 0.0, 0.0)]);

        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow_and_update().len(), 1);
    }

    #[test]
    fn postcode_filter_is_case_insensitive_substring() {
        let snapshot = RecordSnapshot::from_records([
            Record::pending(1, 0.0, 0.0).with_field(EditableField::Postcode, "NW1 6XE"),
            Record::pending(2, 0.0, 0.0).with_field(EditableField::Postcode, "SE1 9SG"),
            Record::pending(3, 0.0, 0.0),
        ]);

        let matches = snapshot.pending_matching_postcode("nw1");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, RecordId::Int(1));
        assert_eq!(snapshot.pending_matching_postcode("  ").len(), 3);
    }

    #[test]
    fn markers_cover_every_record() {
        let snapshot = RecordSnapshot::from_records([
            Record::pending(1, 51.5, -0.1),
            Record::pending(2, 51.6, -0.2).approved(chrono::Utc::now()),
        ]);
        let markers = snapshot.markers();
        assert_eq!(markers.len(), 2);
        assert_eq!(
            markers[1],
            MapMarker {
                id: RecordId::Int(2),
                latitude: 51.6,
                longitude: -0.2,
            }
        );
    }
}

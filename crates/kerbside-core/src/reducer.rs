//! Changefeed reconciliation.
//!
//! [`reduce`] folds one [`ChangeEvent`] into the canonical record map and
//! returns a fresh [`RecordSnapshot`]. The pending view is always re-derived
//! from the canonical map, never patched on its own.
//!
//! Events carry no sequence numbers, so the rules are last-writer-wins on
//! `id`: duplicate `created`/`deleted` deliveries are idempotent, an `updated`
//! for an unseen id inserts it, and a `deleted` for an unseen id is a no-op.

use crate::models::ChangeEvent;
use crate::store::{RecordMap, RecordSnapshot};

/// Apply `event` to `all` and return the resulting snapshot.
pub fn reduce(event: &ChangeEvent, all: &RecordMap) -> RecordSnapshot {
    let mut next = all.clone();
    match event {
        ChangeEvent::Created { after } | ChangeEvent::Updated { after, .. } => {
            next.insert(after.id.clone(), after.clone());
        }
        ChangeEvent::Deleted { before } => {
            next.remove(&before.id);
        }
    }
    RecordSnapshot::from_map(next)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{Record, RecordId, RecordStatus};

    fn scenario_a() -> RecordSnapshot {
        let approved_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        RecordSnapshot::from_records([
            Record::pending(1, 51.50, -0.12),
            Record::pending(2, 51.51, -0.13).approved(approved_at),
        ])
    }

    fn assert_pending_is_derived(snapshot: &RecordSnapshot) {
        let expected: Vec<Record> = snapshot
            .all_records()
            .filter(|record| record.is_pending())
            .cloned()
            .collect();
        assert_eq!(snapshot.pending_records(), expected.as_slice());
    }

    #[test]
    fn created_inserts_and_duplicate_delivery_is_idempotent() {
        let start = scenario_a();
        let event = ChangeEvent::created(Record::pending(3, 51.0, 0.0));

        let once = reduce(&event, start.all());
        let twice = reduce(&event, once.all());

        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
        assert_eq!(once.pending_records().len(), 2);
        assert_pending_is_derived(&twice);
    }

    #[test]
    fn updated_to_approved_leaves_pending_queue() {
        let start = scenario_a();
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let event = ChangeEvent::updated(Record::pending(1, 51.50, -0.12).approved(at));

        let next = reduce(&event, start.all());

        assert!(next.pending_records().is_empty());
        let record = next.get(&RecordId::Int(1)).unwrap();
        assert_eq!(record.status, RecordStatus::Approved);
        assert_eq!(record.approved_at, Some(at));
        assert_pending_is_derived(&next);
    }

    #[test]
    fn updated_for_unseen_id_inserts_it() {
        let next = reduce(
            &ChangeEvent::updated(Record::pending(9, 0.0, 0.0)),
            RecordSnapshot::default().all(),
        );
        assert_eq!(next.len(), 1);
        assert_eq!(next.pending_records().len(), 1);
    }

    #[test]
    fn out_of_order_delivery_keeps_last_applied() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let updated = ChangeEvent::updated(Record::pending(5, 0.0, 0.0).approved(at));
        let created = ChangeEvent::created(Record::pending(5, 0.0, 0.0));

        let after_update = reduce(&updated, RecordSnapshot::default().all());
        let after_create = reduce(&created, after_update.all());

        let record = after_create.get(&RecordId::Int(5)).unwrap();
        assert_eq!(record.status, RecordStatus::Pending);
        assert_eq!(after_create.pending_records().len(), 1);
    }

    #[test]
    fn deleted_removes_record_and_keeps_pending() {
        let start = scenario_a();
        let next = reduce(&ChangeEvent::deleted(2), start.all());

        assert_eq!(next.len(), 1);
        assert!(next.get(&RecordId::Int(1)).is_some());
        assert_eq!(next.pending_records(), start.pending_records());
    }

    #[test]
    fn deleted_unknown_id_is_noop_and_idempotent() {
        let start = scenario_a();
        let event = ChangeEvent::deleted(999);

        let once = reduce(&event, start.all());
        let twice = reduce(&event, once.all());

        assert_eq!(once, start);
        assert_eq!(twice, start);
    }
}

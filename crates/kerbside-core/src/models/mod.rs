//! Data models for Kerbside

mod event;
mod record;
mod role;

pub use event::{ChangeEvent, ChangeKind, RecordKey};
pub use record::{EditableField, FieldEdits, Record, RecordFields, RecordId, RecordPatch, RecordStatus};
pub use role::SessionRole;

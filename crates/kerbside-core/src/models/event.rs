//! Changefeed event model

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Record, RecordId};

/// Identity of a record as carried in the `before` image of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey {
    pub id: RecordId,
}

/// What happened to a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// One notification delivered by a changefeed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Created {
        after: Record,
    },
    Updated {
        before: Option<RecordKey>,
        after: Record,
    },
    Deleted {
        before: RecordKey,
    },
}

impl ChangeEvent {
    pub const fn created(after: Record) -> Self {
        Self::Created { after }
    }

    pub fn updated(after: Record) -> Self {
        let before = Some(RecordKey {
            id: after.id.clone(),
        });
        Self::Updated { before, after }
    }

    pub fn deleted(id: impl Into<RecordId>) -> Self {
        Self::Deleted {
            before: RecordKey { id: id.into() },
        }
    }

    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Created { .. } => ChangeKind::Created,
            Self::Updated { .. } => ChangeKind::Updated,
            Self::Deleted { .. } => ChangeKind::Deleted,
        }
    }

    /// Id of the row the event is keyed on.
    pub const fn record_id(&self) -> &RecordId {
        match self {
            Self::Created { after } | Self::Updated { after, .. } => &after.id,
            Self::Deleted { before } => &before.id,
        }
    }
}

//! Shared state types.

use std::fmt;

/// Lifecycle of the record sync for the current session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// No admin session; the store is empty.
    #[default]
    Inactive,
    /// Bulk load in flight.
    Loading,
    /// Loaded and following the changefeed.
    Active,
    /// Bulk load failed or the changefeed dropped.
    Error,
}

impl SyncState {
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

//! Error types for kerbside-core

use thiserror::Error;

use crate::models::RecordId;

/// Result type alias using kerbside-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in kerbside-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote service answered with an error status
    #[error("API error: {0}")]
    Api(String),

    /// Initial bulk fetch of records failed
    #[error("Bulk load failed: {0}")]
    BulkLoad(String),

    /// Changefeed could not be opened or dropped mid-stream
    #[error("Changefeed error: {0}")]
    Subscription(String),

    /// Sync is parked in its error state
    #[error("Record sync failed: {0}")]
    Sync(String),

    /// Approve/delete write was rejected
    #[error("Write to record {id} failed: {message}")]
    Write { id: RecordId, message: String },

    /// Write attempted while the sync controller is not active
    #[error("Sync is not active; writes are only accepted while the dashboard is live")]
    NotActive,

    /// Signed-in principal lacks the admin role
    #[error("Signed-in principal is not an admin")]
    AccessDenied,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub(crate) fn write(id: &RecordId, source: &Self) -> Self {
        Self::Write {
            id: id.clone(),
            message: source.to_string(),
        }
    }
}

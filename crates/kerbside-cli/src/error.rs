use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] kerbside_core::Error),
    #[error(transparent)]
    Config(#[from] kerbside_core::config::ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Not signed in. Run `kerbside auth login --email <EMAIL> --password <PASSWORD>` first.")]
    NotSignedIn,
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Record {0} has already been approved")]
    AlreadyApproved(String),
    #[error("Invalid field edit '{0}': expected FIELD=VALUE")]
    InvalidEdit(String),
}

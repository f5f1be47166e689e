//! kerbside-core - Core library for Kerbside
//!
//! This crate keeps a local view of crowd-sourced parking restrictions in
//! step with the hosted records table: bulk load, changefeed reconciliation,
//! admin gating, and the approve/delete actions used by every Kerbside
//! interface.

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod feed;
pub mod gate;
pub mod memory;
pub mod models;
pub mod reducer;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use dashboard::Dashboard;
pub use error::{Error, Result};
pub use models::{ChangeEvent, EditableField, FieldEdits, Record, RecordId, RecordStatus, SessionRole};
pub use state::SyncState;
pub use store::{RecordSnapshot, RecordStore};

pub mod approve;
pub mod auth_cmd;
pub mod common;
pub mod delete;
pub mod pending;
pub mod records;
pub mod watch;

//! Kerbside CLI - operator console for the parking restrictions dashboard
//!
//! Review the pending queue, approve or delete submissions, and follow the
//! queue live from the terminal.

mod auth;
mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::approve::run_approve;
use crate::commands::auth_cmd::run_auth;
use crate::commands::delete::run_delete;
use crate::commands::pending::run_pending;
use crate::commands::records::run_records;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "kerbside=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Auth { command } => run_auth(command).await?,
        Commands::Pending { postcode, json } => run_pending(postcode.as_deref(), json).await?,
        Commands::Records { json } => run_records(json).await?,
        Commands::Approve { id, edits } => run_approve(&id, &edits).await?,
        Commands::Delete { id } => run_delete(&id).await?,
        Commands::Watch { postcode } => run_watch(postcode.as_deref()).await?,
    }

    Ok(())
}

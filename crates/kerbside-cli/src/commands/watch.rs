use std::time::Duration;

use kerbside_core::{Dashboard, Error, SessionRole, SyncState};

use crate::commands::common::{connect, load_config};
use crate::commands::pending::render_pending;
use crate::error::CliError;

const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run_watch(postcode: Option<&str>) -> Result<(), CliError> {
    let config = load_config()?;
    let (dashboard, auth) = connect(&config).await?;
    let refresher = tokio::spawn(async move { auth.keep_session_fresh(SESSION_CHECK_INTERVAL).await });

    let outcome = follow(&dashboard, postcode).await;

    refresher.abort();
    dashboard.shutdown();
    outcome
}

/// Reprint the pending queue on every change until Ctrl-C or loss of access.
async fn follow(dashboard: &Dashboard, postcode: Option<&str>) -> Result<(), CliError> {
    let mut records = dashboard.record_changes();
    let mut state = dashboard.sync_state_changes();
    let mut role = dashboard.role_changes();
    print_queue(dashboard, postcode)?;

    loop {
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => {
                interrupted?;
                return Ok(());
            }
            changed = role.changed() => {
                if changed.is_err() || *role.borrow_and_update() == SessionRole::None {
                    return Err(Error::AccessDenied.into());
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *state.borrow_and_update();
                match (current, dashboard.last_error()) {
                    (SyncState::Error, Some(message)) => eprintln!("sync: error ({message})"),
                    _ => eprintln!("sync: {current}"),
                }
            }
            changed = records.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                print_queue(dashboard, postcode)?;
            }
        }
    }
}

fn print_queue(dashboard: &Dashboard, postcode: Option<&str>) -> Result<(), CliError> {
    println!("{}", queue_header(dashboard));
    println!("{}", render_pending(dashboard, postcode, false)?);
    Ok(())
}

pub fn queue_header(dashboard: &Dashboard) -> String {
    let snapshot = dashboard.snapshot();
    format!(
        "-- {} pending of {} records --",
        snapshot.pending_records().len(),
        snapshot.len()
    )
}

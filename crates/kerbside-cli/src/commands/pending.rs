use kerbside_core::Dashboard;

use crate::commands::common::{load_config, open_dashboard, render_records};
use crate::error::CliError;

pub async fn run_pending(postcode: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let config = load_config()?;
    let dashboard = open_dashboard(&config).await?;
    println!("{}", render_pending(&dashboard, postcode, as_json)?);
    dashboard.shutdown();
    Ok(())
}

pub fn render_pending(
    dashboard: &Dashboard,
    postcode: Option<&str>,
    as_json: bool,
) -> Result<String, CliError> {
    let records = dashboard.pending_matching_postcode(postcode.unwrap_or_default());
    render_records(&records, as_json)
}

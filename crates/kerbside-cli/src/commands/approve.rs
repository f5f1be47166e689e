use kerbside_core::{Dashboard, RecordId};

use crate::commands::common::{
    load_config, open_dashboard, parse_field_edits, parse_record_id, pending_record,
};
use crate::error::CliError;

pub async fn run_approve(id: &str, edits: &[String]) -> Result<(), CliError> {
    let id = parse_record_id(id)?;
    let config = load_config()?;
    let dashboard = open_dashboard(&config).await?;
    approve_record(&dashboard, &id, edits).await?;
    println!("{id}");
    dashboard.shutdown();
    Ok(())
}

/// Stage `edits` as the record's draft and approve it.
pub async fn approve_record(
    dashboard: &Dashboard,
    id: &RecordId,
    edits: &[String],
) -> Result<(), CliError> {
    let edits = parse_field_edits(edits)?;
    pending_record(dashboard, id)?;
    for (field, value) in edits.iter() {
        dashboard.edit_field(id, field, value);
    }
    dashboard.approve(id).await?;
    Ok(())
}

use kerbside_core::{Dashboard, RecordId};

use crate::commands::common::{load_config, open_dashboard, parse_record_id};
use crate::error::CliError;

pub async fn run_delete(id: &str) -> Result<(), CliError> {
    let id = parse_record_id(id)?;
    let config = load_config()?;
    let dashboard = open_dashboard(&config).await?;
    delete_record(&dashboard, &id).await?;
    println!("{id}");
    dashboard.shutdown();
    Ok(())
}

pub async fn delete_record(dashboard: &Dashboard, id: &RecordId) -> Result<(), CliError> {
    if dashboard.snapshot().get(id).is_none() {
        return Err(CliError::RecordNotFound(id.to_string()));
    }
    dashboard.delete(id).await?;
    Ok(())
}

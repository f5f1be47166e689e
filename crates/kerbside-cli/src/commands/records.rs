use crate::commands::common::{load_config, open_dashboard, render_records};
use crate::error::CliError;

pub async fn run_records(as_json: bool) -> Result<(), CliError> {
    let config = load_config()?;
    let dashboard = open_dashboard(&config).await?;
    println!("{}", render_records(&dashboard.all_records(), as_json)?);
    dashboard.shutdown();
    Ok(())
}

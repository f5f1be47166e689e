use kerbside_core::config::DashboardConfig;
use kerbside_core::models::RecordFields;
use kerbside_core::{Dashboard, EditableField, FieldEdits, Record, RecordId, RecordStatus};
use serde::Serialize;

use crate::auth::{auth_client, identity, CliAuthClient};
use crate::error::CliError;

pub fn load_config() -> Result<DashboardConfig, CliError> {
    Ok(DashboardConfig::from_env()?)
}

/// Restore the stored session; expired sessions are refreshed.
pub async fn restore_signed_in(config: &DashboardConfig) -> Result<CliAuthClient, CliError> {
    let client = auth_client(config).map_err(|error| CliError::Auth(error.to_string()))?;
    client
        .restore_session()
        .await
        .map_err(|error| CliError::Auth(error.to_string()))?
        .ok_or(CliError::NotSignedIn)?;
    Ok(client)
}

/// Connect a dashboard for the stored session and wait for live records.
pub async fn open_dashboard(config: &DashboardConfig) -> Result<Dashboard, CliError> {
    Ok(connect(config).await?.0)
}

/// Like [`open_dashboard`], also handing back the auth client so long-running
/// commands can keep the session fresh.
pub async fn connect(config: &DashboardConfig) -> Result<(Dashboard, CliAuthClient), CliError> {
    let identity = identity(config).map_err(|error| CliError::Auth(error.to_string()))?;
    identity
        .auth()
        .restore_session()
        .await
        .map_err(|error| CliError::Auth(error.to_string()))?
        .ok_or(CliError::NotSignedIn)?;
    let auth = identity.auth().clone();

    let dashboard = Dashboard::connect(config, identity)?;
    dashboard.ready().await?;
    Ok((dashboard, auth))
}

pub fn parse_record_id(raw: &str) -> Result<RecordId, CliError> {
    Ok(raw.parse::<RecordId>()?)
}

/// Parse `FIELD=VALUE` pairs; later edits of the same field win.
pub fn parse_field_edits(raw: &[String]) -> Result<FieldEdits, CliError> {
    let mut edits = FieldEdits::new();
    for pair in raw {
        let (field, value) = pair
            .split_once('=')
            .ok_or_else(|| CliError::InvalidEdit(pair.clone()))?;
        if field.trim().is_empty() {
            return Err(CliError::InvalidEdit(pair.clone()));
        }
        let field = field.parse::<EditableField>()?;
        edits.set(field, value.trim());
    }
    Ok(edits)
}

/// Look up `id` in the live snapshot, refusing already-approved records.
pub fn pending_record(dashboard: &Dashboard, id: &RecordId) -> Result<Record, CliError> {
    let record = dashboard
        .snapshot()
        .get(id)
        .cloned()
        .ok_or_else(|| CliError::RecordNotFound(id.to_string()))?;
    if record.status == RecordStatus::Approved {
        return Err(CliError::AlreadyApproved(id.to_string()));
    }
    Ok(record)
}

pub fn format_record_lines(records: &[Record]) -> Vec<String> {
    records.iter().map(format_record_line).collect()
}

fn format_record_line(record: &Record) -> String {
    let fields = &record.fields;
    let approved = record
        .approved_at
        .map(|at| format!("  approved {}", at.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_default();
    format!(
        "{:<8} {:<9} {:<10} {:<28} ({:.5}, {:.5}){}",
        record.id,
        record.status.as_str(),
        label(fields.postcode.as_deref()),
        label(fields.road_name.as_deref()),
        record.latitude,
        record.longitude,
        approved
    )
}

fn label(value: Option<&str>) -> &str {
    value.filter(|value| !value.trim().is_empty()).unwrap_or("-")
}

#[derive(Debug, Serialize)]
pub struct RecordListItem<'a> {
    pub id: &'a RecordId,
    pub status: RecordStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub approved_at: Option<String>,
    #[serde(flatten)]
    pub fields: &'a RecordFields,
}

pub fn record_to_list_item(record: &Record) -> RecordListItem<'_> {
    RecordListItem {
        id: &record.id,
        status: record.status,
        latitude: record.latitude,
        longitude: record.longitude,
        approved_at: record.approved_at.map(|at| at.to_rfc3339()),
        fields: &record.fields,
    }
}

pub fn render_records(records: &[Record], as_json: bool) -> Result<String, CliError> {
    if as_json {
        let items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem<'_>>>();
        return Ok(serde_json::to_string_pretty(&items)?);
    }
    if records.is_empty() {
        return Ok("No records.".to_string());
    }
    Ok(format_record_lines(records).join("\n"))
}

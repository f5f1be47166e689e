use std::sync::Arc;

use async_trait::async_trait;
use kerbside_core::auth::{AuthResult, AuthSession, AuthUser, IdentityProvider};
use kerbside_core::memory::MemoryBackend;
use kerbside_core::sync::{SyncDeps, SyncSettings};
use kerbside_core::{Dashboard, EditableField, Record, RecordId, RecordStatus, SessionRole};
use pretty_assertions::assert_eq;
use tokio::sync::watch;

use crate::commands::approve::approve_record;
use crate::commands::common::{format_record_lines, parse_field_edits, parse_record_id, render_records};
use crate::commands::delete::delete_record;
use crate::commands::pending::render_pending;
use crate::commands::watch::queue_header;
use crate::error::CliError;

struct AdminIdentity {
    state: watch::Sender<Option<AuthSession>>,
}

#[async_trait]
impl IdentityProvider for AdminIdentity {
    fn auth_state(&self) -> watch::Receiver<Option<AuthSession>> {
        self.state.subscribe()
    }

    async fn lookup_role(&self, _session: &AuthSession) -> AuthResult<SessionRole> {
        Ok(SessionRole::Admin)
    }
}

fn sample_records() -> Vec<Record> {
    vec![
        Record::pending(1, 51.52262, -0.15710)
            .with_field(EditableField::Postcode, "NW1 6XE")
            .with_field(EditableField::RoadName, "Baker Street"),
        Record::pending(2, 51.50330, -0.11950).with_field(EditableField::Postcode, "SE1 7PB"),
        Record::pending(3, 51.51000, -0.13000)
            .approved(chrono::DateTime::from_timestamp(1_709_283_600, 0).unwrap()),
    ]
}

async fn live_dashboard(backend: &MemoryBackend) -> Dashboard {
    let (state, _) = watch::channel(Some(AuthSession {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        expires_at: i64::MAX,
        user: AuthUser {
            id: "admin-user".to_string(),
            email: Some("admin@example.com".to_string()),
        },
    }));
    let dashboard = Dashboard::start(
        Arc::new(AdminIdentity { state }),
        SyncDeps {
            records: Arc::new(backend.clone()),
            feed: Arc::new(backend.clone()),
            bulk: None,
        },
        SyncSettings::default(),
    );
    dashboard.ready().await.unwrap();
    dashboard
}

#[test]
fn parse_field_edits_accepts_column_and_snake_case_names() {
    let edits = parse_field_edits(&[
        "Maximum Stay=2 hours".to_string(),
        "postcode= NW1 6XE ".to_string(),
        "valid-parking-permits=Zone A".to_string(),
    ])
    .unwrap();

    assert_eq!(edits.get(EditableField::MaximumStay), Some("2 hours"));
    assert_eq!(edits.get(EditableField::Postcode), Some("NW1 6XE"));
    assert_eq!(edits.get(EditableField::ValidParkingPermits), Some("Zone A"));
}

#[test]
fn parse_field_edits_keeps_equals_signs_in_values() {
    let edits = parse_field_edits(&["notes=pay=display".to_string()]).unwrap();
    assert_eq!(edits.get(EditableField::Notes), Some("pay=display"));
}

#[test]
fn parse_field_edits_rejects_malformed_pairs() {
    assert!(matches!(
        parse_field_edits(&["no separator".to_string()]),
        Err(CliError::InvalidEdit(_))
    ));
    assert!(matches!(
        parse_field_edits(&["=value".to_string()]),
        Err(CliError::InvalidEdit(_))
    ));
    assert!(matches!(
        parse_field_edits(&["colour=red".to_string()]),
        Err(CliError::Core(_))
    ));
}

#[test]
fn parse_record_id_handles_numeric_and_text_ids() {
    assert_eq!(parse_record_id(" 42 ").unwrap(), RecordId::Int(42));
    assert_eq!(
        parse_record_id("a1b2").unwrap(),
        RecordId::Text("a1b2".to_string())
    );
    assert!(parse_record_id("  ").is_err());
}

#[test]
fn format_record_lines_fill_missing_fields() {
    let lines = format_record_lines(&sample_records());

    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("NW1 6XE"));
    assert!(lines[0].contains("Baker Street"));
    assert!(lines[0].contains("(51.52262, -0.15710)"));
    assert!(lines[1].contains("SE1 7PB"));
    assert!(lines[1].contains(" - "));
    assert!(lines[2].contains("approved 2024-03-01 09:00 UTC"));
}

#[test]
fn render_records_as_json_uses_column_names() {
    let rendered = render_records(&sample_records()[..1], true).unwrap();
    let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

    assert_eq!(value[0]["id"], 1);
    assert_eq!(value[0]["status"], "pending");
    assert_eq!(value[0]["Postcode"], "NW1 6XE");
    assert_eq!(value[0]["Road Name"], "Baker Street");
    assert!(value[0]["approved_at"].is_null());
}

#[test]
fn render_records_reports_empty_list() {
    assert_eq!(render_records(&[], false).unwrap(), "No records.");
}

#[tokio::test(flavor = "current_thread")]
async fn render_pending_filters_by_postcode() {
    let backend = MemoryBackend::with_records(sample_records());
    let dashboard = live_dashboard(&backend).await;

    let all = render_pending(&dashboard, None, false).unwrap();
    let filtered = render_pending(&dashboard, Some("se1"), false).unwrap();

    assert_eq!(all.lines().count(), 2);
    assert_eq!(filtered.lines().count(), 1);
    assert!(filtered.contains("SE1 7PB"));
    assert_eq!(queue_header(&dashboard), "-- 2 pending of 3 records --");
}

#[tokio::test(flavor = "current_thread")]
async fn approve_record_applies_edits() {
    let backend = MemoryBackend::with_records(sample_records());
    let dashboard = live_dashboard(&backend).await;

    approve_record(
        &dashboard,
        &RecordId::Int(2),
        &["Restriction Type=Single yellow line".to_string()],
    )
    .await
    .unwrap();

    let approved = backend
        .rows()
        .into_iter()
        .find(|record| record.id == RecordId::Int(2))
        .unwrap();
    assert_eq!(approved.status, RecordStatus::Approved);
    assert_eq!(
        approved.fields.get(EditableField::RestrictionType),
        Some("Single yellow line")
    );
    assert_eq!(dashboard.draft(&RecordId::Int(2)), None);
}

#[tokio::test(flavor = "current_thread")]
async fn approve_record_refuses_unknown_and_approved_records() {
    let backend = MemoryBackend::with_records(sample_records());
    let dashboard = live_dashboard(&backend).await;

    assert!(matches!(
        approve_record(&dashboard, &RecordId::Int(99), &[]).await,
        Err(CliError::RecordNotFound(_))
    ));
    assert!(matches!(
        approve_record(&dashboard, &RecordId::Int(3), &[]).await,
        Err(CliError::AlreadyApproved(_))
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn delete_record_removes_row() {
    let backend = MemoryBackend::with_records(sample_records());
    let dashboard = live_dashboard(&backend).await;

    delete_record(&dashboard, &RecordId::Int(1)).await.unwrap();

    assert_eq!(backend.rows().len(), 2);
    assert!(matches!(
        delete_record(&dashboard, &RecordId::Int(42)).await,
        Err(CliError::RecordNotFound(_))
    ));
}

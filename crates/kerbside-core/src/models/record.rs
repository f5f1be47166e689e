//! Parking restriction record model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Stable record identifier as issued by the remote table.
///
/// PostgREST hands out numeric ids for `bigint` keys and strings for text or
/// uuid keys; both are kept verbatim so filters round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("Record ID cannot be empty".to_string()));
        }
        Ok(trimmed
            .parse::<i64>()
            .map_or_else(|_| Self::Text(trimmed.to_string()), Self::Int))
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Review status of a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Pending,
    Approved,
}

impl RecordStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }
}

/// Attributes an admin may edit before approving a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EditableField {
    RoadName,
    RestrictionType,
    ControlledParkingZone,
    TimesOfOperation,
    MaximumStay,
    NearestMachine,
    Notes,
    ParkingSpaces,
    Postcode,
    ValidParkingPermits,
}

impl EditableField {
    /// Every editable field, in review-form order.
    pub const ALL: [Self; 10] = [
        Self::RoadName,
        Self::RestrictionType,
        Self::ControlledParkingZone,
        Self::TimesOfOperation,
        Self::MaximumStay,
        Self::NearestMachine,
        Self::Notes,
        Self::ParkingSpaces,
        Self::Postcode,
        Self::ValidParkingPermits,
    ];

    /// Column name in the remote table.
    pub const fn column(self) -> &'static str {
        match self {
            Self::RoadName => "Road Name",
            Self::RestrictionType => "Restriction Type",
            Self::ControlledParkingZone => "Controlled Parking Zone",
            Self::TimesOfOperation => "Times Of Operation",
            Self::MaximumStay => "Maximum Stay",
            Self::NearestMachine => "Nearest Machine",
            Self::Notes => "Notes",
            Self::ParkingSpaces => "Parking Spaces",
            Self::Postcode => "Postcode",
            Self::ValidParkingPermits => "Valid Parking Permits",
        }
    }
}

impl fmt::Display for EditableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for EditableField {
    type Err = Error;

    /// Accepts the column name or its snake-case form, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace(['_', '-'], " ").to_lowercase();
        Self::ALL
            .into_iter()
            .find(|field| field.column().to_lowercase() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown editable field: {s}")))
    }
}

/// Free-form attributes of a record, keyed by their column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    #[serde(rename = "Road Name", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub road_name: Option<String>,
    #[serde(rename = "Restriction Type", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub restriction_type: Option<String>,
    #[serde(rename = "Controlled Parking Zone", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub controlled_parking_zone: Option<String>,
    #[serde(rename = "Times Of Operation", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub times_of_operation: Option<String>,
    #[serde(rename = "Maximum Stay", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub maximum_stay: Option<String>,
    #[serde(rename = "Nearest Machine", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub nearest_machine: Option<String>,
    #[serde(rename = "Notes", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(rename = "Parking Spaces", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub parking_spaces: Option<String>,
    #[serde(rename = "Postcode", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(rename = "Valid Parking Permits", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub valid_parking_permits: Option<String>,
    #[serde(rename = "Image URL", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl RecordFields {
    pub fn get(&self, field: EditableField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set(&mut self, field: EditableField, value: impl Into<String>) {
        *self.slot_mut(field) = Some(value.into());
    }

    const fn slot(&self, field: EditableField) -> &Option<String> {
        match field {
            EditableField::RoadName => &self.road_name,
            EditableField::RestrictionType => &self.restriction_type,
            EditableField::ControlledParkingZone => &self.controlled_parking_zone,
            EditableField::TimesOfOperation => &self.times_of_operation,
            EditableField::MaximumStay => &self.maximum_stay,
            EditableField::NearestMachine => &self.nearest_machine,
            EditableField::Notes => &self.notes,
            EditableField::ParkingSpaces => &self.parking_spaces,
            EditableField::Postcode => &self.postcode,
            EditableField::ValidParkingPermits => &self.valid_parking_permits,
        }
    }

    fn slot_mut(&mut self, field: EditableField) -> &mut Option<String> {
        match field {
            EditableField::RoadName => &mut self.road_name,
            EditableField::RestrictionType => &mut self.restriction_type,
            EditableField::ControlledParkingZone => &mut self.controlled_parking_zone,
            EditableField::TimesOfOperation => &mut self.times_of_operation,
            EditableField::MaximumStay => &mut self.maximum_stay,
            EditableField::NearestMachine => &mut self.nearest_machine,
            EditableField::Notes => &mut self.notes,
            EditableField::ParkingSpaces => &mut self.parking_spaces,
            EditableField::Postcode => &mut self.postcode,
            EditableField::ValidParkingPermits => &mut self.valid_parking_permits,
        }
    }
}

/// A crowd-sourced parking restriction awaiting or past review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(rename = "Latitude", deserialize_with = "coordinate")]
    pub latitude: f64,
    #[serde(rename = "Longitude", deserialize_with = "coordinate")]
    pub longitude: f64,
    #[serde(flatten)]
    pub fields: RecordFields,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

impl Record {
    /// A freshly submitted record with no attributes filled in.
    pub fn pending(id: impl Into<RecordId>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            status: RecordStatus::Pending,
            latitude,
            longitude,
            fields: RecordFields::default(),
            approved_at: None,
        }
    }

    #[must_use]
    pub fn approved(mut self, at: DateTime<Utc>) -> Self {
        self.status = RecordStatus::Approved;
        self.approved_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: EditableField, value: impl Into<String>) -> Self {
        self.fields.set(field, value);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == RecordStatus::Pending
    }

    /// `approved_at` is set exactly when the record is approved.
    pub fn has_consistent_approval(&self) -> bool {
        matches!(
            (self.status, self.approved_at),
            (RecordStatus::Approved, Some(_)) | (RecordStatus::Pending, None)
        )
    }
}

/// Per-field edits keyed by field, in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldEdits(BTreeMap<EditableField, String>);

impl FieldEdits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: EditableField, value: impl Into<String>) {
        self.0.insert(field, value.into());
    }

    #[must_use]
    pub fn with(mut self, field: EditableField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: EditableField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EditableField, &str)> {
        self.0.iter().map(|(field, value)| (*field, value.as_str()))
    }
}

/// Column/value pairs sent to the record service in an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RecordPatch(Map<String, Value>);

impl RecordPatch {
    /// Edited fields plus the approval transition, set together.
    pub fn approval(edits: &FieldEdits, approved_at: DateTime<Utc>) -> Self {
        let mut columns = Map::new();
        for (field, value) in edits.iter() {
            columns.insert(field.column().to_string(), Value::String(value.to_string()));
        }
        columns.insert(
            "status".to_string(),
            Value::String(RecordStatus::Approved.as_str().to_string()),
        );
        columns.insert(
            "approved_at".to_string(),
            Value::String(approved_at.to_rfc3339()),
        );
        Self(columns)
    }

    pub fn columns(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Apply the patch to a record the way the remote table would.
    pub fn apply_to(&self, record: &Record) -> Result<Record> {
        let mut row = match serde_json::to_value(record)? {
            Value::Object(row) => row,
            _ => return Err(Error::InvalidInput("record did not serialize to a row".to_string())),
        };
        for (column, value) in &self.0 {
            if column == "id" {
                continue;
            }
            row.insert(column.clone(), value.clone());
        }
        Ok(serde_json::from_value(Value::Object(row))?)
    }
}

fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}

fn coordinate<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("coordinate out of range")),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid coordinate: {text}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected a numeric coordinate, got {other}"
        ))),
    }
}

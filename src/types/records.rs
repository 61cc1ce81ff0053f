//! Raw and cleaned sensor/event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Columns every non-empty raw dataset must carry.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "timestamp",
    "device_id",
    "device_name",
    "employee_id",
    "employee_name",
    "category",
    "parameter",
    "value",
];

/// One observation from site equipment or personnel, as loaded.
///
/// Every field is optional at this layer: input files may have blank cells
/// or unparseable values. Cleaning turns these into [`CleanRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub employee_id: Option<String>,
    pub employee_name: Option<String>,
    pub category: Option<String>,
    /// Key identifying the measured quantity (e.g. `temp`, `heart_rate`)
    pub parameter: Option<String>,
    pub value: Option<f64>,
}

impl RawRecord {
    /// Convenience constructor for a measurement with only the fields the
    /// feature pipeline actually consumes.
    pub fn measurement(timestamp: DateTime<Utc>, parameter: &str, value: f64) -> Self {
        Self {
            timestamp: Some(timestamp),
            parameter: Some(parameter.to_string()),
            value: Some(value),
            ..Default::default()
        }
    }
}

/// A record admitted past cleaning: timestamp, parameter and value are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub timestamp: DateTime<Utc>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub employee_id: Option<String>,
    pub employee_name: Option<String>,
    pub category: Option<String>,
    pub parameter: String,
    pub value: f64,
}

impl CleanRecord {
    /// Promote a raw record, or `None` if a required cell is missing.
    pub fn from_raw(raw: RawRecord) -> Option<Self> {
        let timestamp = raw.timestamp?;
        let value = raw.value.filter(|v| !v.is_nan())?;
        let parameter = raw.parameter?;
        Some(Self {
            timestamp,
            device_id: raw.device_id,
            device_name: raw.device_name,
            employee_id: raw.employee_id,
            employee_name: raw.employee_name,
            category: raw.category,
            parameter,
            value,
        })
    }
}

impl From<CleanRecord> for RawRecord {
    fn from(rec: CleanRecord) -> Self {
        Self {
            timestamp: Some(rec.timestamp),
            device_id: rec.device_id,
            device_name: rec.device_name,
            employee_id: rec.employee_id,
            employee_name: rec.employee_name,
            category: rec.category,
            parameter: Some(rec.parameter),
            value: Some(rec.value),
        }
    }
}

/// Combined dataset produced by the raw loader.
///
/// `columns` is the union of the headers seen across all input files, in
/// first-seen order. Schema validation checks it against [`REQUIRED_COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl RawDataset {
    pub fn new(columns: Vec<String>, records: Vec<RawRecord>) -> Self {
        Self { columns, records }
    }

    /// Dataset with the full required schema, for in-process callers.
    pub fn from_records(records: Vec<RawRecord>) -> Self {
        Self {
            columns: REQUIRED_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            records,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Required columns absent from this dataset, in schema order.
    pub fn missing_columns(&self) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .filter(|required| !self.columns.iter().any(|c| c == *required))
            .map(|c| (*c).to_string())
            .collect()
    }
}

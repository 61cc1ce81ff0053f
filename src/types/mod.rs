//! Shared data structures for the sensor feature and model pipeline
//!
//! This module defines the core types that flow between subsystems:
//! - Raw layer: `RawRecord` / `RawDataset` (as loaded from tabular snapshots)
//! - Cleaned layer: `CleanRecord` (timestamp and value guaranteed present)
//! - Feature layer: `FeatureTable` + `FeatureMetadata`
//! - Registry layer: `RegistryEntry` (one per completed training run)

mod records;
mod feature_table;
mod registry;

pub use records::*;
pub use feature_table::*;
pub use registry::*;

use serde::Serialize;

/// Result of an operation that may legitimately find nothing to work on.
///
/// Empty input is a normal outcome for training and inference, not an error.
/// Serializes as `{"status": "ok", ...fields of T}` or `{"status": "no-data"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum Outcome<T> {
    #[serde(rename = "ok")]
    Ready(T),
    #[serde(rename = "no-data")]
    NoData,
}

impl<T> Outcome<T> {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    /// Borrow the payload if the operation produced one.
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::NoData => None,
        }
    }

    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::NoData => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        rows: usize,
    }

    #[test]
    fn test_outcome_serializes_status_tag() {
        let ready = serde_json::to_value(Outcome::Ready(Payload { rows: 3 })).unwrap();
        assert_eq!(ready["status"], "ok");
        assert_eq!(ready["rows"], 3);

        let empty = serde_json::to_value(Outcome::<Payload>::NoData).unwrap();
        assert_eq!(empty, serde_json::json!({"status": "no-data"}));
    }
}

//! Raw record validation and cleaning
//!
//! ## Steps
//! 1. Schema check against the required column set
//! 2. Chronological sort
//! 3. Drop rows missing timestamp / value / parameter
//! 4. Drop exact duplicates
//! 5. Per-parameter robust outlier suppression (median / MAD z-score)
//!
//! Suppression replaces an outlier with its group median; row count is
//! preserved.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::stats;
use super::FeatureError;
use crate::types::{CleanRecord, RawDataset, RawRecord};

/// Consistency constant that makes MAD comparable to a standard deviation.
pub const MAD_SCALE: f64 = 0.6745;

/// Values with a robust z-score at or above this magnitude are suppressed.
pub const OUTLIER_Z_THRESHOLD: f64 = 8.0;

/// Fail with a schema error if any required column is missing.
pub fn validate_schema(dataset: &RawDataset) -> Result<(), FeatureError> {
    let missing = dataset.missing_columns();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(FeatureError::Schema { missing })
    }
}

/// Stable ascending sort by timestamp; missing timestamps sort last.
pub fn sort_by_timestamp(records: &mut [RawRecord]) {
    records.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Robust z-score; a zero MAD is replaced by 1.0.
pub fn robust_z(value: f64, median: f64, mad: f64) -> f64 {
    let spread = if mad == 0.0 { 1.0 } else { mad };
    MAD_SCALE * (value - median) / spread
}

/// Identity of a row for exact-duplicate detection.
type RowKey = (
    DateTime<Utc>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    u64,
);

fn row_key(rec: &CleanRecord) -> RowKey {
    (
        rec.timestamp,
        rec.device_id.clone(),
        rec.device_name.clone(),
        rec.employee_id.clone(),
        rec.employee_name.clone(),
        rec.category.clone(),
        rec.parameter.clone(),
        rec.value.to_bits(),
    )
}

/// Clean raw records into records with guaranteed timestamp and value.
pub fn clean(records: Vec<RawRecord>) -> Vec<CleanRecord> {
    let total = records.len();

    let present: Vec<CleanRecord> = records.into_iter().filter_map(CleanRecord::from_raw).collect();
    let dropped_missing = total - present.len();

    let mut seen: HashSet<RowKey> = HashSet::with_capacity(present.len());
    let mut cleaned: Vec<CleanRecord> = present
        .into_iter()
        .filter(|rec| seen.insert(row_key(rec)))
        .collect();
    let dropped_duplicates = total - dropped_missing - cleaned.len();

    let suppressed = suppress_outliers(&mut cleaned);

    debug!(
        input = total,
        dropped_missing,
        dropped_duplicates,
        suppressed,
        output = cleaned.len(),
        "Cleaned raw records"
    );

    cleaned
}

/// Replace per-parameter outliers with the parameter's median.
///
/// Returns the number of values replaced.
pub fn suppress_outliers(records: &mut [CleanRecord]) -> usize {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, rec) in records.iter().enumerate() {
        groups.entry(rec.parameter.clone()).or_default().push(i);
    }

    let mut replaced = 0;
    for indices in groups.values() {
        let values: Vec<f64> = indices.iter().map(|&i| records[i].value).collect();
        let median = stats::median(&values);
        let mad = stats::median_abs_deviation(&values, median);

        for &i in indices {
            if robust_z(records[i].value, median, mad).abs() >= OUTLIER_Z_THRESHOLD {
                records[i].value = median;
                replaced += 1;
            }
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 6, 0, 0).unwrap()
    }

    fn temp_series(values: &[f64]) -> Vec<RawRecord> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| RawRecord::measurement(t0() + Duration::minutes(i as i64), "temp", *v))
            .collect()
    }

    #[test]
    fn test_outlier_replaced_with_group_median() {
        let cleaned = clean(temp_series(&[10.0, 12.0, 1000.0]));
        let values: Vec<f64> = cleaned.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![10.0, 12.0, 12.0]);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let once = clean(temp_series(&[10.0, 12.0, 1000.0, 11.0, 13.0, -400.0]));
        let twice = clean(once.iter().cloned().map(RawRecord::from).collect());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_no_remaining_value_beyond_threshold() {
        let mut values: Vec<f64> = (0..50).map(|i| 20.0 + (i % 7) as f64 * 0.5).collect();
        values.extend([500.0, -300.0, 9_999.0]);
        let cleaned = clean(temp_series(&values));

        let v: Vec<f64> = cleaned.iter().map(|r| r.value).collect();
        let med = stats::median(&v);
        let mad = stats::median_abs_deviation(&v, med);
        assert!(mad > 0.0);
        for x in v {
            assert!(robust_z(x, med, mad).abs() < OUTLIER_Z_THRESHOLD);
        }
    }

    #[test]
    fn test_zero_mad_does_not_divide_by_zero() {
        // Median 5, MAD 0 -> spread falls back to 1.0; 5.0 deviation gives z = 3.37
        let cleaned = clean(temp_series(&[5.0, 5.0, 5.0, 10.0]));
        assert_eq!(cleaned[3].value, 10.0);
        assert!(robust_z(10.0, 5.0, 0.0).is_finite());
    }

    #[test]
    fn test_groups_are_independent() {
        let mut records = temp_series(&[10.0, 11.0, 12.0]);
        records.push(RawRecord::measurement(t0(), "pressure", 1000.0));
        records.push(RawRecord::measurement(t0() + Duration::minutes(1), "pressure", 1001.0));
        let cleaned = clean(records);
        assert!(cleaned.iter().any(|r| r.parameter == "pressure" && r.value == 1000.0));
    }

    #[test]
    fn test_drops_missing_and_duplicates() {
        let mut records = temp_series(&[1.0, 2.0]);
        records.push(records[0].clone());
        let mut no_value = records[1].clone();
        no_value.value = None;
        records.push(no_value);
        let mut no_param = records[1].clone();
        no_param.parameter = None;
        records.push(no_param);

        assert_eq!(clean(records).len(), 2);
    }

    #[test]
    fn test_far_future_timestamps_are_distinct_rows() {
        // Both lie beyond the i64 nanosecond range
        let records = vec![
            RawRecord::measurement(Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap(), "temp", 5.0),
            RawRecord::measurement(Utc.with_ymd_and_hms(2301, 6, 1, 0, 0, 0).unwrap(), "temp", 5.0),
        ];
        assert_eq!(clean(records).len(), 2);
    }

    #[test]
    fn test_sort_puts_missing_timestamps_last() {
        let mut records = temp_series(&[1.0, 2.0]);
        records.reverse();
        records.insert(0, RawRecord::default());
        sort_by_timestamp(&mut records);
        assert_eq!(records[0].value, Some(1.0));
        assert!(records[2].timestamp.is_none());
    }

    #[test]
    fn test_schema_error_lists_missing() {
        let ds = RawDataset::new(vec!["timestamp".into()], vec![RawRecord::default()]);
        match validate_schema(&ds) {
            Err(FeatureError::Schema { missing }) => assert_eq!(missing.len(), 7),
            other => panic!("expected schema error, got {other:?}"),
        }
    }
}

//! Fixed-width windowed aggregation.
//!
//! Buckets are anchored at midnight (UTC) of the first row's day and every
//! bucket between the first and last row is emitted, including empty ones.
//! Each input column expands to `{col}_mean`, `{col}_std`, `{col}_min`,
//! `{col}_max`; empty buckets are filled forward then backward.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::stats;
use crate::types::FeatureTable;

/// Statistics computed per bucket, in output column order.
pub const STATISTICS: [&str; 4] = ["mean", "std", "min", "max"];

pub const DEFAULT_INTERVAL: &str = "5min";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid aggregation interval '{0}': expected <n><unit> with unit s, min/T, h/H or d/D")]
pub struct InvalidInterval(pub String);

/// Bucket width for windowed statistics, keeping the configured label
/// (e.g. `5min`) for metadata reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AggregationInterval {
    label: String,
    width: Duration,
}

impl AggregationInterval {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> Duration {
        self.width
    }
}

impl Default for AggregationInterval {
    fn default() -> Self {
        Self {
            label: DEFAULT_INTERVAL.to_string(),
            width: Duration::minutes(5),
        }
    }
}

impl FromStr for AggregationInterval {
    type Err = InvalidInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidInterval(s.to_string());
        let pattern = Regex::new(r"^\s*(\d+)\s*(s|S|sec|min|T|h|H|d|D)\s*$").map_err(|_| invalid())?;
        let caps = pattern.captures(s).ok_or_else(invalid)?;

        let n: i64 = caps[1].parse().map_err(|_| invalid())?;
        if n <= 0 {
            return Err(invalid());
        }
        let unit_secs: i64 = match &caps[2] {
            "s" | "S" | "sec" => 1,
            "min" | "T" => 60,
            "h" | "H" => 3_600,
            _ => 86_400,
        };
        let secs = n.checked_mul(unit_secs).ok_or_else(invalid)?;
        let width = Duration::try_seconds(secs).ok_or_else(invalid)?;

        Ok(Self {
            label: s.trim().to_string(),
            width,
        })
    }
}

impl TryFrom<String> for AggregationInterval {
    type Error = InvalidInterval;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregationInterval> for String {
    fn from(value: AggregationInterval) -> Self {
        value.label
    }
}

impl fmt::Display for AggregationInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Resample a time-indexed table into fixed-width statistical windows.
///
/// The input index must be sorted ascending (as produced by the pivot).
pub fn aggregate(table: &FeatureTable, interval: &AggregationInterval) -> Result<FeatureTable, String> {
    let (Some(first), Some(last)) = (table.index().first(), table.index().last()) else {
        return Ok(FeatureTable::empty());
    };
    if table.n_cols() == 0 {
        return Ok(FeatureTable::empty());
    }

    let origin = first
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|n| n.and_utc())
        .ok_or_else(|| format!("cannot anchor buckets at {first}"))?;
    let width_ms = interval.width().num_milliseconds().max(1);
    let bucket_of = |t: &DateTime<Utc>| (*t - origin).num_milliseconds().div_euclid(width_ms);

    let first_bucket = bucket_of(first);
    let n_buckets = usize::try_from(bucket_of(last) - first_bucket + 1)
        .map_err(|_| "feature table index is not sorted ascending".to_string())?;

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_buckets];
    for (row, t) in table.index().iter().enumerate() {
        let slot = usize::try_from(bucket_of(t) - first_bucket)
            .map_err(|_| "feature table index is not sorted ascending".to_string())?;
        members[slot].push(row);
    }

    let index: Vec<DateTime<Utc>> = (0..n_buckets)
        .map(|b| origin + Duration::milliseconds((first_bucket + b as i64) * width_ms))
        .collect();

    let mut out = FeatureTable::from_columns(index, Vec::new())?;
    for (name, values) in table.columns() {
        let mut per_stat: [Vec<f64>; 4] = Default::default();
        for rows in &members {
            let window: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
            per_stat[0].push(stats::mean(&window));
            per_stat[1].push(stats::sample_std(&window));
            per_stat[2].push(stats::min(&window));
            per_stat[3].push(stats::max(&window));
        }
        for (stat, mut column) in STATISTICS.iter().zip(per_stat) {
            stats::forward_backward_fill(&mut column);
            out.push_column(format!("{name}_{stat}"), column)?;
        }
    }

    // A column with no observation at all (e.g. std when every bucket holds
    // a single row) cannot be filled from neighbours.
    for column in out.columns_mut() {
        if column.iter().all(|v| v.is_nan()) {
            column.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_parse_intervals() {
        assert_eq!("5min".parse::<AggregationInterval>().unwrap().width(), Duration::minutes(5));
        assert_eq!("30s".parse::<AggregationInterval>().unwrap().width(), Duration::seconds(30));
        assert_eq!("1H".parse::<AggregationInterval>().unwrap().width(), Duration::hours(1));
        assert_eq!("15T".parse::<AggregationInterval>().unwrap().width(), Duration::minutes(15));
        assert_eq!("2d".parse::<AggregationInterval>().unwrap().width(), Duration::days(2));
        assert!("0min".parse::<AggregationInterval>().is_err());
        assert!("five minutes".parse::<AggregationInterval>().is_err());
        assert_eq!(AggregationInterval::default().label(), "5min");
    }

    #[test]
    fn test_stat_columns_and_values() {
        let table = FeatureTable::from_columns(
            vec![at(0, 0, 0), at(0, 1, 0), at(0, 2, 0)],
            vec![("param_temp".into(), vec![10.0, 12.0, 12.0])],
        )
        .unwrap();
        let out = aggregate(&table, &AggregationInterval::default()).unwrap();

        assert_eq!(out.n_rows(), 1);
        assert_eq!(
            out.column_names(),
            &["param_temp_mean", "param_temp_std", "param_temp_min", "param_temp_max"]
        );
        let mean = out.column("param_temp_mean").unwrap()[0];
        assert!((mean - 34.0 / 3.0).abs() < 1e-12);
        assert_eq!(out.column("param_temp_min").unwrap()[0], 10.0);
        assert_eq!(out.column("param_temp_max").unwrap()[0], 12.0);
        assert!(out.column("param_temp_std").unwrap()[0] > 0.0);
    }

    #[test]
    fn test_empty_buckets_are_filled() {
        let table = FeatureTable::from_columns(
            vec![at(0, 1, 0), at(0, 2, 0), at(0, 21, 0)],
            vec![("x".into(), vec![1.0, 3.0, 7.0])],
        )
        .unwrap();
        let out = aggregate(&table, &AggregationInterval::default()).unwrap();

        // buckets 00:00, 00:05, 00:10, 00:15, 00:20
        assert_eq!(out.n_rows(), 5);
        assert_eq!(out.index()[0], at(0, 0, 0));
        assert_eq!(out.index()[4], at(0, 20, 0));
        assert_eq!(out.column("x_mean").unwrap(), &[2.0, 2.0, 2.0, 2.0, 7.0]);
        assert_eq!(out.missing_cells(), 0);
    }

    #[test]
    fn test_all_missing_std_becomes_zero() {
        let table = FeatureTable::from_columns(
            vec![at(0, 0, 0), at(0, 10, 0)],
            vec![("x".into(), vec![1.0, 2.0])],
        )
        .unwrap();
        let out = aggregate(&table, &AggregationInterval::default()).unwrap();
        assert_eq!(out.column("x_std").unwrap(), &[0.0, 0.0, 0.0]);
        assert_eq!(out.missing_cells(), 0);
    }

    #[test]
    fn test_serde_as_label() {
        let interval: AggregationInterval = serde_json::from_str("\"10min\"").unwrap();
        assert_eq!(interval.width(), Duration::minutes(10));
        assert_eq!(serde_json::to_string(&interval).unwrap(), "\"10min\"");
    }
}

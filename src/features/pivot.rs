//! Long-to-wide reshape: one row per timestamp, one column per parameter.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::stats::forward_backward_fill;
use crate::types::{CleanRecord, FeatureTable};

/// Prefix applied to every pivoted parameter column.
pub const PARAM_PREFIX: &str = "param_";

/// Pivot cleaned records into a gap-free wide table.
///
/// Cells are the mean of all values sharing a timestamp and parameter
/// (several devices may report the same parameter at the same instant).
/// Columns are ordered by parameter name; remaining gaps are filled forward
/// then backward.
pub fn pivot_parameters(records: &[CleanRecord]) -> FeatureTable {
    if records.is_empty() {
        return FeatureTable::empty();
    }

    let parameters: BTreeSet<&str> = records.iter().map(|r| r.parameter.as_str()).collect();
    let column_of: BTreeMap<&str, usize> = parameters.iter().enumerate().map(|(i, p)| (*p, i)).collect();

    // timestamp -> per-column (sum, count)
    let mut cells: BTreeMap<DateTime<Utc>, Vec<(f64, usize)>> = BTreeMap::new();
    for rec in records {
        let row = cells
            .entry(rec.timestamp)
            .or_insert_with(|| vec![(0.0, 0); parameters.len()]);
        let cell = &mut row[column_of[rec.parameter.as_str()]];
        cell.0 += rec.value;
        cell.1 += 1;
    }

    let index: Vec<DateTime<Utc>> = cells.keys().copied().collect();
    let columns = parameters
        .iter()
        .enumerate()
        .map(|(c, param)| {
            let mut values: Vec<f64> = cells
                .values()
                .map(|row| {
                    let (sum, n) = row[c];
                    if n == 0 {
                        f64::NAN
                    } else {
                        sum / n as f64
                    }
                })
                .collect();
            forward_backward_fill(&mut values);
            (format!("{PARAM_PREFIX}{param}"), values)
        })
        .collect();

    // Names are unique (BTreeSet) and every column has one value per row.
    FeatureTable::from_columns(index, columns).unwrap_or_default()
}

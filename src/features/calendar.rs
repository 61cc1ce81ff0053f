//! Calendar features derived from each row's timestamp.

use chrono::{Datelike, Timelike};

use crate::types::FeatureTable;

pub const HOUR_COLUMN: &str = "hour";
pub const DAY_OF_WEEK_COLUMN: &str = "dayofweek";
pub const WEEKEND_COLUMN: &str = "is_weekend";

/// Append `hour` (0-23), `dayofweek` (Monday = 0 .. Sunday = 6) and
/// `is_weekend` (1 on Saturday/Sunday, else 0).
pub fn add_time_features(table: &FeatureTable) -> Result<FeatureTable, String> {
    if table.is_empty() {
        return Ok(table.clone());
    }

    let hours: Vec<f64> = table.index().iter().map(|t| f64::from(t.hour())).collect();
    let days: Vec<f64> = table
        .index()
        .iter()
        .map(|t| f64::from(t.weekday().num_days_from_monday()))
        .collect();
    let weekend: Vec<f64> = days
        .iter()
        .map(|d| if *d >= 5.0 { 1.0 } else { 0.0 })
        .collect();

    let mut out = table.clone();
    out.push_column(HOUR_COLUMN, hours)?;
    out.push_column(DAY_OF_WEEK_COLUMN, days)?;
    out.push_column(WEEKEND_COLUMN, weekend)?;
    Ok(out)
}

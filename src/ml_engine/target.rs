//! Supervised target heuristic.
//!
//! Prefer the most completely observed column among those that actually
//! vary. Ties on observation count go to the earlier column.

use crate::features::stats;
use crate::types::FeatureTable;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetSelectionError {
    #[error("no numeric columns available for target selection")]
    NoNumericColumns,
    #[error("all numeric columns have zero variance")]
    NoVariance,
}

/// Pick the target column for the baseline and regression bundles.
///
/// A column with fewer than two observations has no defined spread and is
/// treated as zero-variance.
pub fn select_target(table: &FeatureTable) -> Result<String, TargetSelectionError> {
    if table.n_cols() == 0 {
        return Err(TargetSelectionError::NoNumericColumns);
    }

    let mut best: Option<(&str, usize)> = None;
    for (name, values) in table.columns() {
        let std = stats::sample_std(values);
        if std.is_nan() || std <= 0.0 {
            continue;
        }
        let count = stats::count_present(values);
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((name, count)),
        }
    }

    best.map(|(name, _)| name.to_string())
        .ok_or(TargetSelectionError::NoVariance)
}

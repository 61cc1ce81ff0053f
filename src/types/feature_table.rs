//! Time-indexed, column-oriented feature table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wide table with one row per time bucket and one `f64` column per feature.
///
/// Storage is column-major. Missing cells are represented as `NaN` while the
/// table is being built; a table returned by the feature builder has none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    index: Vec<DateTime<Utc>>,
    names: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from an index and named columns.
    ///
    /// Every column must have exactly one value per index entry and names
    /// must be unique.
    pub fn from_columns(
        index: Vec<DateTime<Utc>>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, String> {
        let mut table = Self {
            index,
            names: Vec::with_capacity(columns.len()),
            values: Vec::with_capacity(columns.len()),
        };
        for (name, values) in columns {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    /// Append a column at the end of the column order.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), String> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(format!(
                "column '{}' has {} values, table has {} rows",
                name,
                values.len(),
                self.index.len()
            ));
        }
        if self.names.contains(&name) {
            return Err(format!("duplicate column '{name}'"));
        }
        self.names.push(name);
        self.values.push(values);
        Ok(())
    }

    /// True when the table has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.names.is_empty()
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.position(name).map(|i| self.values[i].as_slice())
    }

    /// Iterate `(name, values)` pairs in column order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .zip(self.values.iter())
            .map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub(crate) fn columns_mut(&mut self) -> impl Iterator<Item = &mut Vec<f64>> {
        self.values.iter_mut()
    }

    /// Number of `NaN` cells across the whole table.
    pub fn missing_cells(&self) -> usize {
        self.values
            .iter()
            .map(|col| col.iter().filter(|v| v.is_nan()).count())
            .sum()
    }

    /// Row-major matrix of the named columns, selected by name.
    ///
    /// Names that are not present are returned separately and their cells
    /// are filled with `NaN`, leaving it to the caller's imputer to decide.
    pub fn select_rows(&self, names: &[String]) -> (Vec<Vec<f64>>, Vec<String>) {
        let positions: Vec<Option<usize>> = names.iter().map(|n| self.position(n)).collect();
        let absent = names
            .iter()
            .zip(&positions)
            .filter(|(_, p)| p.is_none())
            .map(|(n, _)| n.clone())
            .collect();

        let rows = (0..self.n_rows())
            .map(|r| {
                positions
                    .iter()
                    .map(|p| p.map_or(f64::NAN, |c| self.values[c][r]))
                    .collect()
            })
            .collect();

        (rows, absent)
    }
}

/// Descriptive metadata reported alongside a built feature table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    pub rows: usize,
    pub columns: usize,
    /// Aggregation interval label as configured (e.g. `5min`)
    pub agg_interval: String,
}

impl FeatureMetadata {
    pub fn describe(table: &FeatureTable, agg_interval: &str) -> Self {
        Self {
            rows: table.n_rows(),
            columns: table.n_cols(),
            agg_interval: agg_interval.to_string(),
        }
    }
}

//! Preprocessing stage shared by every bundle: median imputation, then
//! standardization. Statistics are frozen at fit time.

use serde::{Deserialize, Serialize};

use super::MlError;
use crate::features::stats;

fn check_width(rows: &[Vec<f64>], expected: usize) -> Result<(), MlError> {
    match rows.iter().find(|r| r.len() != expected) {
        Some(row) => Err(MlError::RaggedInput {
            expected,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

fn column(rows: &[Vec<f64>], c: usize) -> Vec<f64> {
    rows.iter().map(|r| r[c]).collect()
}

/// Replaces `NaN` cells with the fit-time column median.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    /// A column with no observed value at fit time imputes to 0.0.
    pub fn fit(rows: &[Vec<f64>], n_features: usize) -> Result<Self, MlError> {
        check_width(rows, n_features)?;
        let medians = (0..n_features)
            .map(|c| {
                let m = stats::median(&column(rows, c));
                if m.is_nan() { 0.0 } else { m }
            })
            .collect();
        Ok(Self { medians })
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, MlError> {
        check_width(rows, self.medians.len())?;
        Ok(rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.medians)
                    .map(|(v, m)| if v.is_nan() { *m } else { *v })
                    .collect()
            })
            .collect())
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }
}

/// Zero-mean, unit-variance scaling (population std). Constant columns get
/// a scale of 1.0 and therefore map to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>], n_features: usize) -> Result<Self, MlError> {
        check_width(rows, n_features)?;
        let mut means = Vec::with_capacity(n_features);
        let mut scales = Vec::with_capacity(n_features);
        for c in 0..n_features {
            let values = column(rows, c);
            let mean = stats::mean(&values);
            let std = stats::population_std(&values);
            means.push(if mean.is_finite() { mean } else { 0.0 });
            scales.push(if std.is_finite() && std > 0.0 { std } else { 1.0 });
        }
        Ok(Self { means, scales })
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, MlError> {
        check_width(rows, self.means.len())?;
        Ok(rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.scales))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect())
    }
}

/// Imputer followed by scaler, fit together on the same rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    imputer: MedianImputer,
    scaler: StandardScaler,
}

impl Preprocessor {
    pub fn fit(rows: &[Vec<f64>], n_features: usize) -> Result<Self, MlError> {
        let imputer = MedianImputer::fit(rows, n_features)?;
        let imputed = imputer.transform(rows)?;
        let scaler = StandardScaler::fit(&imputed, n_features)?;
        Ok(Self { imputer, scaler })
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, MlError> {
        self.scaler.transform(&self.imputer.transform(rows)?)
    }

    pub fn n_features(&self) -> usize {
        self.imputer.medians.len()
    }

    /// True when imputer and scaler were fit on the same width.
    pub fn is_consistent(&self) -> bool {
        let n = self.imputer.medians.len();
        self.scaler.means.len() == n && self.scaler.scales.len() == n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imputes_with_fit_time_median() {
        let train = vec![vec![1.0], vec![f64::NAN], vec![3.0], vec![10.0]];
        let imputer = MedianImputer::fit(&train, 1).unwrap();
        assert_eq!(imputer.medians(), &[3.0]);

        let out = imputer.transform(&[vec![f64::NAN], vec![5.0]]).unwrap();
        assert_eq!(out, vec![vec![3.0], vec![5.0]]);
    }

    #[test]
    fn test_scaler_statistics_are_frozen() {
        let train = vec![vec![0.0, 7.0], vec![2.0, 7.0], vec![4.0, 7.0]];
        let pre = Preprocessor::fit(&train, 2).unwrap();

        let fitted = pre.transform(&train).unwrap();
        let col0: Vec<f64> = fitted.iter().map(|r| r[0]).collect();
        assert!(stats::mean(&col0).abs() < 1e-12);
        assert!((stats::population_std(&col0) - 1.0).abs() < 1e-12);
        // constant column maps to zero
        assert!(fitted.iter().all(|r| r[1] == 0.0));

        // new data is scaled with the training mean/std, not its own
        let later = pre.transform(&[vec![100.0, 7.0]]).unwrap();
        let expected = (100.0 - 2.0) / (8.0f64 / 3.0).sqrt();
        assert!((later[0][0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let pre = Preprocessor::fit(&[vec![1.0, 2.0]], 2).unwrap();
        assert!(matches!(
            pre.transform(&[vec![1.0]]),
            Err(MlError::RaggedInput { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_all_missing_column_imputes_zero() {
        let pre = Preprocessor::fit(&[vec![f64::NAN], vec![f64::NAN]], 1).unwrap();
        assert_eq!(pre.transform(&[vec![f64::NAN]]).unwrap(), vec![vec![0.0]]);
    }
}

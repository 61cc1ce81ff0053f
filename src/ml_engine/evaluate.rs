//! Regression fit metrics reported after training.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean absolute error
    pub mae: f64,
    /// Coefficient of determination
    pub r2: f64,
}

/// MAE and R² of `predicted` against `actual`.
///
/// A constant `actual` gives R² of 1.0 on a perfect fit and 0.0 otherwise.
pub fn evaluate_regression(actual: &[f64], predicted: &[f64]) -> RegressionMetrics {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return RegressionMetrics { mae: 0.0, r2: 0.0 };
    }
    let pairs = actual.iter().zip(predicted).take(n);

    let mae = pairs.clone().map(|(a, p)| (a - p).abs()).sum::<f64>() / n as f64;
    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let ss_res: f64 = pairs.map(|(a, p)| (a - p).powi(2)).sum();
    let ss_tot: f64 = actual[..n].iter().map(|a| (a - mean).powi(2)).sum();

    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };
    RegressionMetrics { mae, r2 }
}

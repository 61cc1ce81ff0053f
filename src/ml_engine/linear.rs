//! Ordinary least squares regressor used by the baseline bundle.
//!
//! Solves the normal equations on centred data. A vanishing ridge term keeps
//! the system solvable when windowed statistics are collinear (e.g. `_mean`,
//! `_min` and `_max` coincide for single-sample buckets), which approximates
//! the minimum-norm least-squares solution.

use serde::{Deserialize, Serialize};

use super::MlError;

const RIDGE_EPS: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearRegression {
    pub fn fit(x: &[Vec<f64>], y: &[f64]) -> Result<Self, MlError> {
        let n = x.len();
        if n == 0 {
            return Err(MlError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(MlError::TargetLengthMismatch { rows: n, targets: y.len() });
        }
        let p = x[0].len();
        if let Some(row) = x.iter().find(|r| r.len() != p) {
            return Err(MlError::RaggedInput { expected: p, found: row.len() });
        }

        let x_mean: Vec<f64> = (0..p)
            .map(|j| x.iter().map(|r| r[j]).sum::<f64>() / n as f64)
            .collect();
        let y_mean = y.iter().sum::<f64>() / n as f64;

        // Gram matrix and moment vector of the centred data
        let mut gram = vec![vec![0.0; p]; p];
        let mut moment = vec![0.0; p];
        for (row, target) in x.iter().zip(y) {
            let centred: Vec<f64> = row.iter().zip(&x_mean).map(|(v, m)| v - m).collect();
            let dy = target - y_mean;
            for a in 0..p {
                moment[a] += centred[a] * dy;
                for b in a..p {
                    gram[a][b] += centred[a] * centred[b];
                }
            }
        }
        for a in 0..p {
            for b in 0..a {
                gram[a][b] = gram[b][a];
            }
        }

        let trace: f64 = (0..p).map(|a| gram[a][a]).sum();
        let ridge = RIDGE_EPS * (trace / p.max(1) as f64).max(1.0);
        for (a, row) in gram.iter_mut().enumerate() {
            row[a] += ridge;
        }

        let coefficients = solve(gram, moment);
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(&x_mean)
                .map(|(c, m)| c * m)
                .sum::<f64>();

        Ok(Self { coefficients, intercept })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}

/// Gaussian elimination with partial pivoting. Pivots that collapse to zero
/// leave the corresponding coefficient at 0.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);

        let diag = a[col][col];
        if diag.abs() < f64::EPSILON {
            continue;
        }
        for row in col + 1..n {
            let factor = a[row][col] / diag;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let diag = a[row][row];
        if diag.abs() < f64::EPSILON {
            continue;
        }
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / diag;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_exact_linear_relation() {
        // y = 3 + 2*x0 - x1
        let x: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 3.0 + 2.0 * r[0] - r[1]).collect();

        let model = LinearRegression::fit(&x, &y).unwrap();
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-6);
        assert!((model.coefficients()[1] + 1.0).abs() < 1e-6);
        assert!((model.intercept() - 3.0).abs() < 1e-6);
        assert!((model.predict_row(&[10.0, 2.0]) - 21.0).abs() < 1e-6);
    }

    #[test]
    fn test_collinear_and_constant_columns() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, i as f64, 0.0]).collect();
        let y: Vec<f64> = (0..10).map(|i| 2.0 * i as f64).collect();

        let model = LinearRegression::fit(&x, &y).unwrap();
        assert!(model.coefficients().iter().all(|c| c.is_finite()));
        assert!((model.predict_row(&[4.0, 4.0, 0.0]) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_and_mismatch() {
        assert!(matches!(LinearRegression::fit(&[], &[]), Err(MlError::EmptyTrainingSet)));
        assert!(matches!(
            LinearRegression::fit(&[vec![1.0]], &[1.0, 2.0]),
            Err(MlError::TargetLengthMismatch { .. })
        ));
    }
}

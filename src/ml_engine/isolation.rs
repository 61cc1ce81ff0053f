//! Isolation forest for the anomaly bundle.
//!
//! Scores follow the usual convention: `score_samples` lies in `[-1, 0)` and
//! lower means more anomalous; `decision_function` shifts it by the offset
//! implied by the contamination rate so that negative values are outliers.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::MlError;

/// Sub-sample size per tree (capped by the number of rows).
pub const MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(x: &[Vec<f64>], samples: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut nodes = vec![Node::Leaf { size: 0 }];
        let mut stack = vec![(0usize, samples, 0usize)];

        while let Some((slot, samples, depth)) = stack.pop() {
            if depth >= max_depth || samples.len() <= 1 {
                nodes[slot] = Node::Leaf { size: samples.len() };
                continue;
            }

            // Features that still separate this node's samples
            let ranges: Vec<(usize, f64, f64)> = (0..n_features)
                .filter_map(|f| {
                    let (lo, hi) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                        (lo.min(x[i][f]), hi.max(x[i][f]))
                    });
                    (lo < hi).then_some((f, lo, hi))
                })
                .collect();
            if ranges.is_empty() {
                nodes[slot] = Node::Leaf { size: samples.len() };
                continue;
            }

            let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
            let threshold = rng.gen_range(lo..hi);
            let (left, right): (Vec<usize>, Vec<usize>) =
                samples.into_iter().partition(|&i| x[i][feature] <= threshold);

            let left_slot = nodes.len();
            nodes.push(Node::Leaf { size: 0 });
            let right_slot = nodes.len();
            nodes.push(Node::Leaf { size: 0 });
            nodes[slot] = Node::Split {
                feature,
                threshold,
                left: left_slot,
                right: right_slot,
            };
            stack.push((left_slot, left, depth + 1));
            stack.push((right_slot, right, depth + 1));
        }

        Self { nodes }
    }

    /// Depth at which `row` is isolated, adjusted for unresolved leaf size.
    fn path_length(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { size }) => return depth + average_path_length(*size),
                Some(Node::Split { feature, threshold, left, right }) => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if v <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
                None => return depth,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    max_samples: usize,
    contamination: f64,
    offset: f64,
    n_features: usize,
}

impl IsolationForest {
    pub fn fit(x: &[Vec<f64>], n_trees: usize, contamination: f64, random_state: u64) -> Result<Self, MlError> {
        let n = x.len();
        if n == 0 {
            return Err(MlError::EmptyTrainingSet);
        }
        let n_features = x[0].len();
        if let Some(row) = x.iter().find(|r| r.len() != n_features) {
            return Err(MlError::RaggedInput { expected: n_features, found: row.len() });
        }
        if n_trees == 0 {
            return Err(MlError::InvalidParameter("n_trees must be at least 1".into()));
        }
        if contamination.is_nan() || contamination <= 0.0 || contamination > 0.5 {
            return Err(MlError::InvalidParameter(format!(
                "contamination must be in (0, 0.5], got {contamination}"
            )));
        }

        let max_samples = MAX_SAMPLES.min(n);
        let max_depth = (max_samples.max(2) as f64).log2().ceil() as usize;

        let trees: Vec<IsolationTree> = (0..n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(random_state.wrapping_add(t as u64));
                let samples = index::sample(&mut rng, n, max_samples).into_vec();
                IsolationTree::grow(x, samples, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            max_samples,
            contamination,
            offset: -0.5,
            n_features,
        };

        let training_scores = forest.score_samples(x);
        forest.offset = percentile(&training_scores, 100.0 * contamination);
        Ok(forest)
    }

    /// Opposite of the anomaly score: lower is more anomalous.
    pub fn score_samples(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        let norm = match average_path_length(self.max_samples) {
            c if c > 0.0 => c,
            _ => 1.0,
        };
        let n_trees = self.trees.len().max(1) as f64;
        rows.par_iter()
            .map(|row| {
                let mean_depth = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / n_trees;
                -(2f64.powf(-mean_depth / norm))
            })
            .collect()
    }

    /// `score_samples` shifted so that the contamination share of the
    /// training rows falls below zero.
    pub fn decision_function(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        self.score_samples(rows)
            .into_iter()
            .map(|s| s - self.offset)
            .collect()
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

/// Linear-interpolated percentile (`q` in 0..=100) of non-empty `values`.
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (q / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<Vec<f64>> {
        let mut rows: Vec<Vec<f64>> = (0..200)
            .map(|i| vec![(i % 10) as f64 * 0.1, (i % 7) as f64 * 0.1])
            .collect();
        rows.push(vec![25.0, -30.0]);
        rows
    }

    #[test]
    fn test_outlier_scores_lowest() {
        let rows = cluster_with_outlier();
        let forest = IsolationForest::fit(&rows, 100, 0.02, 42).unwrap();
        let scores = forest.score_samples(&rows);

        let (argmin, _) = scores
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(argmin, rows.len() - 1);
        assert!(scores.iter().all(|s| (-1.0..0.0).contains(s)));
    }

    #[test]
    fn test_decision_function_flags_contamination_share() {
        let rows = cluster_with_outlier();
        let forest = IsolationForest::fit(&rows, 100, 0.02, 42).unwrap();
        let decision = forest.decision_function(&rows);
        let flagged = decision.iter().filter(|d| **d < 0.0).count();
        assert!(flagged >= 1 && flagged <= 5, "flagged {flagged}");
        assert!(decision[rows.len() - 1] < 0.0);
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.244_770_920_119_917).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_interpolates() {
        assert_eq!(percentile(&[4.0, 1.0, 3.0, 2.0], 50.0), 2.5);
        assert_eq!(percentile(&[1.0, 2.0], 0.0), 1.0);
    }

    #[test]
    fn test_invalid_contamination() {
        assert!(matches!(
            IsolationForest::fit(&[vec![1.0]], 10, 0.0, 0),
            Err(MlError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_single_row_is_scorable() {
        let forest = IsolationForest::fit(&[vec![1.0, 2.0]], 5, 0.02, 0).unwrap();
        let scores = forest.score_samples(&[vec![1.0, 2.0]]);
        assert!(scores[0].is_finite());
    }
}

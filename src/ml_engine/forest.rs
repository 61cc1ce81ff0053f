//! Bagged regression trees (random forest) for the regression bundle.
//!
//! Trees are fully grown CART trees on bootstrap samples, split on squared
//! error. Tree `t` is seeded with `random_state + t` so the fitted forest is
//! identical regardless of how rayon schedules the work.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::MlError;

/// Splits whose impurity decrease falls below this are not taken.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grow a tree over the given sample indices (repeats allowed).
    ///
    /// Returns the tree and its raw per-feature impurity decrease.
    fn grow(x: &[Vec<f64>], y: &[f64], samples: Vec<usize>, n_features: usize) -> (Self, Vec<f64>) {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut importances = vec![0.0; n_features];
        let mut stack = vec![(0usize, samples)];

        while let Some((slot, samples)) = stack.pop() {
            let value = samples.iter().map(|&i| y[i]).sum::<f64>() / samples.len().max(1) as f64;

            let split = if samples.len() >= 2 {
                best_split(x, y, &samples, n_features)
            } else {
                None
            };

            match split {
                Some(split) => {
                    importances[split.feature] += split.gain;
                    let (left, right): (Vec<usize>, Vec<usize>) = samples
                        .into_iter()
                        .partition(|&i| x[i][split.feature] <= split.threshold);

                    let left_slot = nodes.len();
                    nodes.push(Node::Leaf { value: 0.0 });
                    let right_slot = nodes.len();
                    nodes.push(Node::Leaf { value: 0.0 });
                    nodes[slot] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left: left_slot,
                        right: right_slot,
                    };
                    stack.push((left_slot, left));
                    stack.push((right_slot, right));
                }
                None => nodes[slot] = Node::Leaf { value },
            }
        }

        (Self { nodes }, importances)
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split { feature, threshold, left, right }) => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if v <= *threshold { *left } else { *right };
                }
                None => return f64::NAN,
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Exhaustive squared-error split search over every feature.
///
/// Maximizes `sL²/nL + sR²/nR - s²/n`, the decrease in summed squared error.
fn best_split(x: &[Vec<f64>], y: &[f64], samples: &[usize], n_features: usize) -> Option<BestSplit> {
    let n = samples.len() as f64;
    let total: f64 = samples.iter().map(|&i| y[i]).sum();
    let parent = total * total / n;

    let mut best: Option<BestSplit> = None;
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(samples.len());

    for feature in 0..n_features {
        pairs.clear();
        pairs.extend(samples.iter().map(|&i| (x[i][feature], y[i])));
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        for k in 0..pairs.len() - 1 {
            left_sum += pairs[k].1;
            let (lo, hi) = (pairs[k].0, pairs[k + 1].0);
            if lo >= hi {
                continue;
            }
            let n_left = (k + 1) as f64;
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / n_left + right_sum * right_sum / (n - n_left) - parent;

            if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                let mid = lo + (hi - lo) / 2.0;
                let threshold = if mid >= hi { lo } else { mid };
                best = Some(BestSplit { feature, threshold, gain });
            }
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
    n_features: usize,
    random_state: u64,
}

impl RandomForestRegressor {
    pub fn fit(x: &[Vec<f64>], y: &[f64], n_trees: usize, random_state: u64) -> Result<Self, MlError> {
        let n = x.len();
        if n == 0 {
            return Err(MlError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(MlError::TargetLengthMismatch { rows: n, targets: y.len() });
        }
        let n_features = x[0].len();
        if let Some(row) = x.iter().find(|r| r.len() != n_features) {
            return Err(MlError::RaggedInput { expected: n_features, found: row.len() });
        }
        if n_trees == 0 {
            return Err(MlError::InvalidParameter("n_trees must be at least 1".into()));
        }

        let grown: Vec<(RegressionTree, Vec<f64>)> = (0..n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(random_state.wrapping_add(t as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::grow(x, y, bootstrap, n_features)
            })
            .collect();

        // Mean decrease in impurity: normalize per tree, average, renormalize.
        let mut feature_importances = vec![0.0; n_features];
        for (_, raw) in &grown {
            let sum: f64 = raw.iter().sum();
            if sum > 0.0 {
                for (acc, v) in feature_importances.iter_mut().zip(raw) {
                    *acc += v / sum;
                }
            }
        }
        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            feature_importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            trees: grown.into_iter().map(|(tree, _)| tree).collect(),
            feature_importances,
            n_features,
            random_state,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return f64::NAN;
        }
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }

    /// Normalized mean decrease in impurity; sums to 1 unless no tree split.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        // y depends only on feature 0; feature 1 is noise-free filler
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64, ((i * 13) % 7) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| if r[0] < 30.0 { 1.0 } else { 5.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_single_tree_fits_step() {
        let (x, y) = step_data();
        let (tree, gains) = RegressionTree::grow(&x, &y, (0..x.len()).collect(), 2);
        assert_eq!(tree.predict_row(&[10.0, 0.0]), 1.0);
        assert_eq!(tree.predict_row(&[50.0, 0.0]), 5.0);
        assert!(gains[0] > 0.0);
        assert_eq!(gains[1], 0.0);
    }

    #[test]
    fn test_forest_importances_normalized_and_ranked() {
        let (x, y) = step_data();
        let forest = RandomForestRegressor::fit(&x, &y, 20, 42).unwrap();
        let imp = forest.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
        assert!((forest.predict_row(&[5.0, 3.0]) - 1.0).abs() < 1.0);
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let (x, y) = step_data();
        let a = RandomForestRegressor::fit(&x, &y, 8, 7).unwrap();
        let b = RandomForestRegressor::fit(&x, &y, 8, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_target_yields_leaf_only_trees() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let forest = RandomForestRegressor::fit(&x, &[2.0; 10], 4, 0).unwrap();
        assert_eq!(forest.feature_importances(), &[0.0]);
        assert_eq!(forest.predict_row(&[3.0]), 2.0);
    }
}

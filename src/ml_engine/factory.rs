//! Pipeline Factory: builds the three untrained bundle specs.

use super::pipeline::{BundleKind, ModelSpec, PipelineSpec};
use crate::types::FeatureTable;

pub const DEFAULT_RANDOM_STATE: u64 = 42;
pub const DEFAULT_REGRESSION_TREES: usize = 120;
pub const DEFAULT_ANOMALY_TREES: usize = 150;
pub const DEFAULT_CONTAMINATION: f64 = 0.02;

/// Hyperparameters shared by every spec the factory produces.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFactory {
    pub random_state: u64,
    pub regression_trees: usize,
    pub anomaly_trees: usize,
    pub contamination: f64,
}

impl Default for PipelineFactory {
    fn default() -> Self {
        Self {
            random_state: DEFAULT_RANDOM_STATE,
            regression_trees: DEFAULT_REGRESSION_TREES,
            anomaly_trees: DEFAULT_ANOMALY_TREES,
            contamination: DEFAULT_CONTAMINATION,
        }
    }
}

impl PipelineFactory {
    /// Every column of `table` except `target`, in table order.
    pub fn supervised_features(table: &FeatureTable, target: &str) -> Vec<String> {
        table
            .column_names()
            .iter()
            .filter(|c| c.as_str() != target)
            .cloned()
            .collect()
    }

    /// Linear regressor over the given features.
    pub fn baseline(&self, features: Vec<String>, target: &str) -> PipelineSpec {
        PipelineSpec {
            kind: BundleKind::Baseline,
            features,
            target: Some(target.to_string()),
            model: ModelSpec::LinearRegression,
        }
    }

    /// Bagged tree ensemble over the given features.
    pub fn regression(&self, features: Vec<String>, target: &str) -> PipelineSpec {
        PipelineSpec {
            kind: BundleKind::Regression,
            features,
            target: Some(target.to_string()),
            model: ModelSpec::RandomForest {
                n_trees: self.regression_trees,
                random_state: self.random_state,
            },
        }
    }

    /// Unsupervised isolation forest over every given column.
    pub fn anomaly(&self, features: Vec<String>) -> PipelineSpec {
        PipelineSpec {
            kind: BundleKind::Anomaly,
            features,
            target: None,
            model: ModelSpec::IsolationForest {
                n_trees: self.anomaly_trees,
                contamination: self.contamination,
                random_state: self.random_state,
            },
        }
    }
}

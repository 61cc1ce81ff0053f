//! Pipeline bundles: preprocessing plus a capability-tagged terminal model.
//!
//! A [`PipelineSpec`] is the untrained description produced by the factory;
//! fitting it against a feature table yields an immutable [`PipelineBundle`]
//! that is persisted as an artifact and later reloaded for inference.
//! Inference never probes a model for methods: it dispatches on the
//! [`Capability`] tags the bundle declares.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::forest::RandomForestRegressor;
use super::isolation::IsolationForest;
use super::linear::LinearRegression;
use super::preprocessing::Preprocessor;
use super::MlError;
use crate::types::FeatureTable;

// ============================================================================
// Kinds and capabilities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    Baseline,
    Regression,
    Anomaly,
}

impl BundleKind {
    pub const ALL: [BundleKind; 3] = [Self::Baseline, Self::Regression, Self::Anomaly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Regression => "regression",
            Self::Anomaly => "anomaly",
        }
    }

    /// Baseline and regression bundles are fit against a target column.
    pub fn is_supervised(&self) -> bool {
        !matches!(self, Self::Anomaly)
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model '{0}' (expected baseline, regression or anomaly)")]
pub struct UnknownBundleKind(pub String);

impl FromStr for BundleKind {
    type Err = UnknownBundleKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "regression" => Ok(Self::Regression),
            "anomaly" => Ok(Self::Anomaly),
            _ => Err(UnknownBundleKind(s.to_string())),
        }
    }
}

/// Scoring operations a terminal model supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    FeatureImportance,
    SampleLikelihood,
    DecisionFunction,
}

// ============================================================================
// Terminal models
// ============================================================================

/// Untrained terminal model with its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    LinearRegression,
    RandomForest {
        n_trees: usize,
        random_state: u64,
    },
    IsolationForest {
        n_trees: usize,
        contamination: f64,
        random_state: u64,
    },
}

/// Fitted terminal model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalModel {
    LinearRegression(LinearRegression),
    RandomForest(RandomForestRegressor),
    IsolationForest(IsolationForest),
}

impl TerminalModel {
    pub fn capabilities(&self) -> Vec<Capability> {
        match self {
            Self::LinearRegression(_) => Vec::new(),
            Self::RandomForest(_) => vec![Capability::FeatureImportance],
            Self::IsolationForest(_) => vec![Capability::SampleLikelihood, Capability::DecisionFunction],
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Self::LinearRegression(m) => m.n_features(),
            Self::RandomForest(m) => m.n_features(),
            Self::IsolationForest(m) => m.n_features(),
        }
    }

    fn supervised(&self) -> bool {
        !matches!(self, Self::IsolationForest(_))
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Option<Vec<f64>> {
        match self {
            Self::LinearRegression(m) => Some(rows.iter().map(|r| m.predict_row(r)).collect()),
            Self::RandomForest(m) => Some(rows.iter().map(|r| m.predict_row(r)).collect()),
            Self::IsolationForest(_) => None,
        }
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        match self {
            Self::RandomForest(m) => Some(m.feature_importances()),
            _ => None,
        }
    }

    fn score_samples(&self, rows: &[Vec<f64>]) -> Option<Vec<f64>> {
        match self {
            Self::IsolationForest(m) => Some(m.score_samples(rows)),
            _ => None,
        }
    }

    fn decision_function(&self, rows: &[Vec<f64>]) -> Option<Vec<f64>> {
        match self {
            Self::IsolationForest(m) => Some(m.decision_function(rows)),
            _ => None,
        }
    }
}

// ============================================================================
// Untrained pipeline
// ============================================================================

/// What to fit: feature columns (order-significant), optional target, and
/// the terminal model's hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSpec {
    pub kind: BundleKind,
    pub features: Vec<String>,
    pub target: Option<String>,
    pub model: ModelSpec,
}

impl PipelineSpec {
    /// Fit preprocessing and model on `table`, selecting columns by name.
    pub fn fit(&self, table: &FeatureTable) -> Result<PipelineBundle, MlError> {
        if self.features.is_empty() {
            return Err(MlError::NoFeatures);
        }
        if table.n_rows() == 0 {
            return Err(MlError::EmptyTrainingSet);
        }

        let (rows, absent) = table.select_rows(&self.features);
        if let Some(name) = absent.into_iter().next() {
            return Err(MlError::MissingColumn(name));
        }

        let targets = match (&self.target, self.kind.is_supervised()) {
            (Some(target), true) => Some(
                table
                    .column(target)
                    .ok_or_else(|| MlError::MissingColumn(target.clone()))?
                    .to_vec(),
            ),
            (None, true) => return Err(MlError::MissingTarget(self.kind.to_string())),
            (_, false) => None,
        };

        // Rows without a label cannot contribute to a supervised fit.
        let (rows, targets) = match targets {
            Some(y) => {
                let (r, t): (Vec<Vec<f64>>, Vec<f64>) = rows
                    .into_iter()
                    .zip(y)
                    .filter(|(_, t)| !t.is_nan())
                    .unzip();
                (r, Some(t))
            }
            None => (rows, None),
        };
        if rows.is_empty() {
            return Err(MlError::EmptyTrainingSet);
        }

        let preprocessor = Preprocessor::fit(&rows, self.features.len())?;
        let x = preprocessor.transform(&rows)?;

        let model = match (&self.model, targets) {
            (ModelSpec::LinearRegression, Some(y)) => TerminalModel::LinearRegression(LinearRegression::fit(&x, &y)?),
            (ModelSpec::RandomForest { n_trees, random_state }, Some(y)) => {
                TerminalModel::RandomForest(RandomForestRegressor::fit(&x, &y, *n_trees, *random_state)?)
            }
            (
                ModelSpec::IsolationForest {
                    n_trees,
                    contamination,
                    random_state,
                },
                None,
            ) => TerminalModel::IsolationForest(IsolationForest::fit(&x, *n_trees, *contamination, *random_state)?),
            (spec, _) => {
                return Err(MlError::InvalidParameter(format!(
                    "{:?} cannot back a {} bundle",
                    spec, self.kind
                )))
            }
        };

        let capabilities = model.capabilities();
        Ok(PipelineBundle {
            kind: self.kind,
            features: self.features.clone(),
            target: self.target.clone().filter(|_| self.kind.is_supervised()),
            preprocessor,
            model,
            capabilities,
            fitted_at: Utc::now(),
        })
    }
}

// ============================================================================
// Fitted bundle
// ============================================================================

/// A fitted preprocessing + model unit. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineBundle {
    pub kind: BundleKind,
    /// Input columns in fit order
    pub features: Vec<String>,
    pub target: Option<String>,
    pub preprocessor: Preprocessor,
    pub model: TerminalModel,
    pub capabilities: Vec<Capability>,
    pub fitted_at: DateTime<Utc>,
}

impl PipelineBundle {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Check that a loaded bundle is internally consistent.
    pub fn validate(&self) -> Result<(), MlError> {
        let invalid = |reason: String| Err(MlError::InvalidShape(reason));

        if self.features.is_empty() {
            return invalid("bundle has no feature columns".into());
        }
        if !self.preprocessor.is_consistent() || self.preprocessor.n_features() != self.features.len() {
            return invalid(format!(
                "preprocessor expects {} columns, bundle lists {}",
                self.preprocessor.n_features(),
                self.features.len()
            ));
        }
        if self.model.n_features() != self.features.len() {
            return invalid(format!(
                "model expects {} columns, bundle lists {}",
                self.model.n_features(),
                self.features.len()
            ));
        }
        if self.model.supervised() != self.kind.is_supervised() {
            return invalid(format!("{} bundle carries an incompatible model", self.kind));
        }
        if self.kind.is_supervised() && self.target.is_none() {
            return invalid(format!("{} bundle has no target", self.kind));
        }
        let declared = self.model.capabilities();
        if declared.len() != self.capabilities.len() || declared.iter().any(|c| !self.has_capability(*c)) {
            return invalid("declared capabilities do not match the model".into());
        }
        Ok(())
    }

    /// Select this bundle's columns from `table` by name and preprocess.
    ///
    /// Also returns the fitted columns the table no longer has; their cells
    /// were imputed with the fit-time median.
    pub fn transform(&self, table: &FeatureTable) -> Result<(Vec<Vec<f64>>, Vec<String>), MlError> {
        let (rows, absent) = table.select_rows(&self.features);
        Ok((self.preprocessor.transform(&rows)?, absent))
    }

    /// Predictions of a supervised bundle for every row of `table`.
    pub fn predict(&self, table: &FeatureTable) -> Result<Vec<f64>, MlError> {
        let (x, _) = self.transform(table)?;
        self.model
            .predict(&x)
            .ok_or_else(|| MlError::Unsupported(format!("{} bundle cannot predict", self.kind)))
    }

    /// `(feature, importance)` pairs ranked by importance, descending.
    ///
    /// Empty when the model does not expose importances.
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        if !self.has_capability(Capability::FeatureImportance) {
            return Vec::new();
        }
        let Some(values) = self.model.feature_importances() else {
            return Vec::new();
        };
        let mut ranked: Vec<(String, f64)> = self.features.iter().cloned().zip(values.iter().copied()).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Native anomaly score per row; lower is more anomalous.
    ///
    /// Uses the sample-likelihood score when declared, else the decision
    /// function, else zeros.
    pub fn anomaly_scores(&self, table: &FeatureTable) -> Result<(Vec<f64>, Vec<String>), MlError> {
        let (x, absent) = self.transform(table)?;
        let scores = if self.has_capability(Capability::SampleLikelihood) {
            self.model.score_samples(&x)
        } else if self.has_capability(Capability::DecisionFunction) {
            self.model.decision_function(&x)
        } else {
            None
        };
        Ok((scores.unwrap_or_else(|| vec![0.0; x.len()]), absent))
    }
}

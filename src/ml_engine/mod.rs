//! ML Engine: target selection, pipeline bundles and the models behind them
//!
//! ## Architecture
//! - `target`: most-observed, non-constant column heuristic
//! - `preprocessing`: median imputer + standard scaler, frozen at fit time
//! - `linear`: ordinary least squares (baseline bundle)
//! - `forest`: bagged CART regression trees (regression bundle)
//! - `isolation`: isolation forest (anomaly bundle)
//! - `pipeline`: bundle kinds, capability tags, untrained spec and fitted bundle
//! - `factory`: the three specs with their fixed hyperparameters
//! - `evaluate`: in-sample MAE / R² for supervised bundles
//!
//! Ensemble fitting is parallelized across trees with rayon; results do not
//! depend on the thread count.

pub mod evaluate;
pub mod factory;
pub mod forest;
pub mod isolation;
pub mod linear;
pub mod pipeline;
pub mod preprocessing;
pub mod target;

pub use evaluate::{evaluate_regression, RegressionMetrics};
pub use factory::PipelineFactory;
pub use pipeline::{BundleKind, Capability, ModelSpec, PipelineBundle, PipelineSpec, TerminalModel, UnknownBundleKind};
pub use preprocessing::Preprocessor;
pub use target::{select_target, TargetSelectionError};

/// Errors raised while fitting or applying a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum MlError {
    #[error("no rows available to fit on")]
    EmptyTrainingSet,
    #[error("pipeline has no feature columns")]
    NoFeatures,
    #[error("row has {found} values, expected {expected}")]
    RaggedInput { expected: usize, found: usize },
    #[error("{rows} rows but {targets} target values")]
    TargetLengthMismatch { rows: usize, targets: usize },
    #[error("column '{0}' not found in feature table")]
    MissingColumn(String),
    #[error("{0} bundle requires a target column")]
    MissingTarget(String),
    #[error("invalid model parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid pipeline: {0}")]
    InvalidShape(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Target(#[from] TargetSelectionError),
}

//! Built-in defaults.
//!
//! Grouped by config section. `ServiceConfig::default()` is assembled from
//! these, so a deployment without a config file behaves identically.

// ============================================================================
// Server
// ============================================================================

pub const HOST: &str = "0.0.0.0";
pub const PORT: u16 = 8100;

/// Allowed cross-origin list (comma-separated); unset means same-origin only.
pub const CORS_ORIGINS_ENV: &str = "MSMS_CORS_ORIGINS";

// ============================================================================
// Data
// ============================================================================

pub const DATA_DIR: &str = "data";
pub const FILE_EXTENSION: &str = "csv";

// ============================================================================
// Features
// ============================================================================

pub const AGG_INTERVAL: &str = crate::features::aggregation::DEFAULT_INTERVAL;

// ============================================================================
// Training
// ============================================================================

pub const RANDOM_STATE: u64 = crate::ml_engine::factory::DEFAULT_RANDOM_STATE;

/// Rayon worker threads; 0 uses every available core.
pub const N_JOBS: usize = 0;

pub const REGRESSION_TREES: usize = crate::ml_engine::factory::DEFAULT_REGRESSION_TREES;
pub const ANOMALY_TREES: usize = crate::ml_engine::factory::DEFAULT_ANOMALY_TREES;
pub const CONTAMINATION: f64 = crate::ml_engine::factory::DEFAULT_CONTAMINATION;

// ============================================================================
// Artifacts
// ============================================================================

pub const MODELS_DIR: &str = "models";

/// Resolved against the models directory when relative.
pub const REGISTRY_FILE: &str = "registry.json";

// ============================================================================
// Inference
// ============================================================================

pub const DEFAULT_MODEL: &str = "regression";
pub const ANOMALY_LIMIT: usize = 50;
pub const TREND_POINTS: usize = crate::inference::DEFAULT_TREND_POINTS;

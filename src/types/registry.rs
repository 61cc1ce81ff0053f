//! Registry entry types (one per completed training run).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FeatureMetadata;

/// Artifact file references for the three bundle kinds of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFiles {
    pub baseline: String,
    pub regression: String,
    pub anomaly: String,
}

/// Append-only record of a completed training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Wall-clock time captured once per run
    pub timestamp: DateTime<Utc>,
    pub models: ModelFiles,
    pub metadata: FeatureMetadata,
}

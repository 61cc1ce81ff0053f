//! Inference Layer
//!
//! Every query rebuilds the feature table from the current raw data and, when
//! it needs a model, loads the latest persisted bundle. Nothing is cached
//! between calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info_span, warn, Span};

use crate::features::{FeatureBuilder, FeatureError};
use crate::ml_engine::{BundleKind, MlError, PipelineBundle};
use crate::storage::{ArtifactStore, RegistryStore, StorageError};
use crate::types::{FeatureMetadata, FeatureTable, Outcome, RegistryEntry};

/// Trend queries return at most this many trailing points by default.
pub const DEFAULT_TREND_POINTS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Model {0} not found")]
    ModelNotFound(String),
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
    #[error("Parameter {0} not found in feature table")]
    ParameterNotFound(String),
    #[error(transparent)]
    Features(#[from] FeatureError),
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Model(#[from] MlError),
}

// ============================================================================
// Response payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub columns: Vec<String>,
    pub metadata: FeatureMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportanceReport {
    pub model: String,
    pub importance: Vec<FeatureImportance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyPoint {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub anomalies: Vec<AnomalyPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub t: DateTime<Utc>,
    pub v: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub parameter: String,
    pub points: Vec<TrendPoint>,
}

// ============================================================================
// Service
// ============================================================================

pub struct InferenceService {
    features: FeatureBuilder,
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<dyn RegistryStore>,
    trend_points: usize,
    span: Span,
}

impl InferenceService {
    pub fn new(
        features: FeatureBuilder,
        artifacts: Arc<dyn ArtifactStore>,
        registry: Arc<dyn RegistryStore>,
    ) -> Self {
        let span = info_span!("inference", artifacts = artifacts.backend_name());
        Self {
            features,
            artifacts,
            registry,
            trend_points: DEFAULT_TREND_POINTS,
            span,
        }
    }

    pub fn with_trend_points(mut self, trend_points: usize) -> Self {
        self.trend_points = trend_points;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn fresh_table(&self) -> Result<Option<(FeatureTable, FeatureMetadata)>, InferenceError> {
        let (table, metadata) = self.features.build_feature_table()?;
        Ok(match metadata {
            Some(metadata) if !table.is_empty() => Some((table, metadata)),
            _ => None,
        })
    }

    /// Load and validate the latest bundle of `kind`.
    pub fn load_bundle(&self, kind: BundleKind) -> Result<PipelineBundle, InferenceError> {
        let bundle = self.artifacts.load(kind).map_err(|e| match e {
            StorageError::NotFound(_) => InferenceError::ModelNotFound(kind.to_string()),
            StorageError::Corrupt { reason, .. } => InferenceError::InvalidPipeline(reason),
            other => InferenceError::Storage(other),
        })?;

        if bundle.kind != kind {
            return Err(InferenceError::InvalidPipeline(format!(
                "artifact for {kind} holds a {} bundle",
                bundle.kind
            )));
        }
        bundle
            .validate()
            .map_err(|e| InferenceError::InvalidPipeline(e.to_string()))?;
        Ok(bundle)
    }

    /// Row count, column names and metadata of a freshly built table.
    pub fn summary(&self) -> Result<Outcome<Summary>, InferenceError> {
        let Some((table, metadata)) = self.fresh_table()? else {
            return Ok(Outcome::NoData);
        };
        Ok(Outcome::Ready(Summary {
            rows: table.n_rows(),
            columns: table.column_names().to_vec(),
            metadata,
        }))
    }

    /// Features of the named bundle ranked by importance, descending.
    ///
    /// Models without importances give an empty list.
    pub fn feature_importance(&self, model: &str) -> Result<ImportanceReport, InferenceError> {
        let kind: BundleKind = model
            .parse()
            .map_err(|_| InferenceError::ModelNotFound(model.to_string()))?;
        let bundle = self.load_bundle(kind)?;

        let importance = bundle
            .feature_importances()
            .into_iter()
            .map(|(feature, importance)| FeatureImportance { feature, importance })
            .collect();
        Ok(ImportanceReport {
            model: model.to_string(),
            importance,
        })
    }

    /// The `limit` most anomalous buckets, lowest score first.
    pub fn anomalies(&self, limit: usize) -> Result<Outcome<AnomalyReport>, InferenceError> {
        let Some((table, _)) = self.fresh_table()? else {
            return Ok(Outcome::NoData);
        };
        let bundle = self.load_bundle(BundleKind::Anomaly)?;

        let _guard = self.span.enter();
        let (scores, absent) = bundle.anomaly_scores(&table)?;
        if !absent.is_empty() {
            warn!(missing = ?absent, "Fitted columns absent from current feature table; imputed");
        }

        let mut ranked: Vec<AnomalyPoint> = table
            .index()
            .iter()
            .zip(scores)
            .map(|(timestamp, score)| AnomalyPoint {
                timestamp: *timestamp,
                score,
            })
            .collect();
        ranked.sort_by(|a, b| a.score.total_cmp(&b.score));
        ranked.truncate(limit);

        debug!(returned = ranked.len(), rows = table.n_rows(), "Ranked anomalies");
        Ok(Outcome::Ready(AnomalyReport { anomalies: ranked }))
    }

    /// Trailing points of one column; defaults to the first column.
    pub fn trend(&self, parameter: Option<&str>) -> Result<Outcome<Trend>, InferenceError> {
        let Some((table, _)) = self.fresh_table()? else {
            return Ok(Outcome::NoData);
        };

        let parameter = match parameter {
            Some(p) => p.to_string(),
            None => match table.column_names().first() {
                Some(first) => first.clone(),
                None => return Ok(Outcome::NoData),
            },
        };
        let values = table
            .column(&parameter)
            .ok_or_else(|| InferenceError::ParameterNotFound(parameter.clone()))?;

        let start = values.len().saturating_sub(self.trend_points);
        let points = table.index()[start..]
            .iter()
            .zip(&values[start..])
            .map(|(t, v)| TrendPoint { t: *t, v: *v })
            .collect();
        Ok(Outcome::Ready(Trend { parameter, points }))
    }

    /// Every registry entry in append order.
    pub fn registry(&self) -> Result<Vec<RegistryEntry>, InferenceError> {
        self.registry.read_all().map_err(InferenceError::Storage)
    }
}

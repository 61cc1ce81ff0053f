//! Training Orchestrator
//!
//! One call runs the whole sequence:
//!
//! ```text
//! build features ─► select target ─► fit baseline / regression / anomaly
//!        │                                        │
//!    (empty: no-data)                             ▼
//!                           save artifacts ─► append registry entry
//! ```
//!
//! Nothing is persisted unless all three bundles fit. Artifacts are written
//! before the registry entry that references them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Span};

use crate::features::{FeatureBuilder, FeatureError};
use crate::ml_engine::{
    evaluate_regression, select_target, BundleKind, MlError, PipelineBundle, PipelineFactory, PipelineSpec,
    RegressionMetrics, TargetSelectionError,
};
use crate::storage::{ArtifactStore, RegistryStore, StorageError};
use crate::types::{FeatureMetadata, FeatureTable, ModelFiles, Outcome, RegistryEntry};

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error(transparent)]
    Features(#[from] FeatureError),
    #[error("target selection failed: {0}")]
    Target(#[from] TargetSelectionError),
    #[error("failed to fit {kind} bundle: {source}")]
    Fit {
        kind: BundleKind,
        #[source]
        source: MlError,
    },
    #[error("failed to persist training run: {0}")]
    Storage(#[from] StorageError),
}

/// What one bundle was trained on, plus in-sample fit quality for
/// supervised bundles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RegressionMetrics>,
}

/// Result of a successful training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub timestamp: DateTime<Utc>,
    pub metadata: FeatureMetadata,
    pub target: String,
    pub baseline: BundleSummary,
    pub regression: BundleSummary,
    pub anomaly: BundleSummary,
    /// Registry file references; absent when the run was not persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelFiles>,
}

pub struct TrainingOrchestrator {
    features: FeatureBuilder,
    factory: PipelineFactory,
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<dyn RegistryStore>,
    span: Span,
}

impl TrainingOrchestrator {
    pub fn new(
        features: FeatureBuilder,
        factory: PipelineFactory,
        artifacts: Arc<dyn ArtifactStore>,
        registry: Arc<dyn RegistryStore>,
    ) -> Self {
        let span = info_span!(
            "training",
            artifacts = artifacts.backend_name(),
            registry = registry.backend_name()
        );
        Self {
            features,
            factory,
            artifacts,
            registry,
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Train, persist and register all three bundles.
    pub fn train_all(&self) -> Result<Outcome<TrainingReport>, TrainingError> {
        self.train_all_with(true)
    }

    /// Train all three bundles; with `persist = false` the run is reported
    /// but neither artifacts nor registry are touched.
    pub fn train_all_with(&self, persist: bool) -> Result<Outcome<TrainingReport>, TrainingError> {
        let (table, metadata) = self.features.build_feature_table()?;
        let _guard = self.span.enter();

        let metadata = match metadata {
            Some(metadata) if !table.is_empty() => metadata,
            _ => {
                warn!("No features available for training");
                return Ok(Outcome::NoData);
            }
        };

        let target = select_target(&table)?;
        let features = PipelineFactory::supervised_features(&table, &target);
        info!(target = %target, features = features.len(), rows = table.n_rows(), "Selected training target");

        let baseline = fit(self.factory.baseline(features.clone(), &target), &table)?;
        let regression = fit(self.factory.regression(features, &target), &table)?;
        let anomaly = fit(self.factory.anomaly(table.column_names().to_vec()), &table)?;

        let timestamp = Utc::now();
        let target_values = table.column(&target).unwrap_or_default();
        let mut report = TrainingReport {
            timestamp,
            metadata,
            target: target.clone(),
            baseline: summarize(&baseline, &table, target_values),
            regression: summarize(&regression, &table, target_values),
            anomaly: summarize(&anomaly, &table, target_values),
            models: None,
        };

        if persist {
            let run_id = timestamp.format("%Y%m%dT%H%M%S%3fZ").to_string();
            let models = ModelFiles {
                baseline: self.artifacts.save(BundleKind::Baseline, &baseline, &run_id)?,
                regression: self.artifacts.save(BundleKind::Regression, &regression, &run_id)?,
                anomaly: self.artifacts.save(BundleKind::Anomaly, &anomaly, &run_id)?,
            };
            self.registry.append(RegistryEntry {
                timestamp,
                models: models.clone(),
                metadata: report.metadata.clone(),
            })?;
            info!(run_id = %run_id, "Saved models and updated registry");
            report.models = Some(models);
        }

        Ok(Outcome::Ready(report))
    }
}

fn fit(spec: PipelineSpec, table: &FeatureTable) -> Result<PipelineBundle, TrainingError> {
    let kind = spec.kind;
    let bundle = spec
        .fit(table)
        .map_err(|source| TrainingError::Fit { kind, source })?;
    info!(kind = %kind, features = bundle.features.len(), "Fitted bundle");
    Ok(bundle)
}

fn summarize(bundle: &PipelineBundle, table: &FeatureTable, target_values: &[f64]) -> BundleSummary {
    let metrics = if bundle.kind.is_supervised() {
        match bundle.predict(table) {
            Ok(predicted) => {
                let metrics = evaluate_regression(target_values, &predicted);
                info!(kind = %bundle.kind, mae = metrics.mae, r2 = metrics.r2, "In-sample fit");
                Some(metrics)
            }
            Err(e) => {
                warn!(kind = %bundle.kind, error = %e, "Could not evaluate bundle");
                None
            }
        }
    } else {
        None
    };

    BundleSummary {
        target: bundle.target.clone(),
        features: bundle.features.clone(),
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::InMemoryLoader;
    use crate::features::AggregationInterval;
    use crate::storage::{InMemoryArtifactStore, InMemoryRegistryStore, RetentionPolicy};
    use crate::types::{RawDataset, RawRecord};
    use chrono::{Duration, TimeZone};

    fn small_factory() -> PipelineFactory {
        PipelineFactory {
            regression_trees: 10,
            anomaly_trees: 20,
            ..PipelineFactory::default()
        }
    }

    fn records(n: i64) -> Vec<RawRecord> {
        let t0 = Utc.with_ymd_and_hms(2024, 4, 2, 6, 0, 0).unwrap();
        (0..n)
            .flat_map(|i| {
                let t = t0 + Duration::minutes(i);
                [
                    RawRecord::measurement(t, "temp", 20.0 + (i % 17) as f64 * 0.3),
                    RawRecord::measurement(t, "co2", 400.0 + (i % 11) as f64 * 2.0),
                ]
            })
            .collect()
    }

    struct Harness {
        orchestrator: TrainingOrchestrator,
        loader: Arc<InMemoryLoader>,
        artifacts: Arc<InMemoryArtifactStore>,
        registry: Arc<InMemoryRegistryStore>,
    }

    fn harness(raw: Vec<RawRecord>) -> Harness {
        let loader = Arc::new(InMemoryLoader::new(RawDataset::from_records(raw)));
        let artifacts = Arc::new(InMemoryArtifactStore::new(RetentionPolicy::Latest));
        let registry = Arc::new(InMemoryRegistryStore::new());
        let orchestrator = TrainingOrchestrator::new(
            FeatureBuilder::new(loader.clone(), AggregationInterval::default()),
            small_factory(),
            artifacts.clone(),
            registry.clone(),
        );
        Harness {
            orchestrator,
            loader,
            artifacts,
            registry,
        }
    }

    #[test]
    fn test_no_data_touches_nothing() {
        let h = harness(Vec::new());
        let outcome = h.orchestrator.train_all().unwrap();
        assert!(outcome.is_no_data());
        assert!(h.registry.read_all().unwrap().is_empty());
        assert!(h.artifacts.file_names().is_empty());
    }

    #[test]
    fn test_successful_run_persists_then_registers() {
        let h = harness(records(120));
        let report = h.orchestrator.train_all().unwrap().into_ready().unwrap();

        assert_eq!(report.baseline.target.as_deref(), Some(report.target.as_str()));
        assert_eq!(report.regression.target, report.baseline.target);
        assert!(!report.regression.features.contains(&report.target));
        assert!(report.anomaly.features.contains(&report.target));
        assert!(report.regression.metrics.is_some());
        assert!(report.anomaly.metrics.is_none());

        let entries = h.registry.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp, report.timestamp);
        assert_eq!(entries[0].metadata, report.metadata);
        assert_eq!(entries[0].models.regression, "regression.json");
        for kind in BundleKind::ALL {
            assert!(h.artifacts.load(kind).is_ok());
        }
    }

    #[test]
    fn test_registry_grows_by_one_per_run() {
        let h = harness(records(60));
        for _ in 0..3 {
            h.orchestrator.train_all().unwrap();
        }
        let entries = h.registry.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_dry_run_does_not_persist() {
        let h = harness(records(60));
        let report = h.orchestrator.train_all_with(false).unwrap().into_ready().unwrap();
        assert!(report.models.is_none());
        assert!(h.registry.read_all().unwrap().is_empty());
        assert!(h.artifacts.file_names().is_empty());
    }

    #[test]
    fn test_fit_failure_persists_nothing() {
        // A single bucket with constant readings: every column has zero variance
        let t0 = Utc.with_ymd_and_hms(2024, 4, 2, 6, 0, 0).unwrap();
        let h = harness(vec![RawRecord::measurement(t0, "temp", 20.0)]);

        let err = h.orchestrator.train_all().unwrap_err();
        assert!(matches!(err, TrainingError::Target(TargetSelectionError::NoVariance)));
        assert!(h.registry.read_all().unwrap().is_empty());
        assert!(h.artifacts.file_names().is_empty());

        // New snapshot arrives; the next run succeeds
        h.loader.replace(RawDataset::from_records(records(30))).unwrap();
        assert!(!h.orchestrator.train_all().unwrap().is_no_data());
    }
}

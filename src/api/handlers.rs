//! API route handlers
//!
//! Feature builds and model fitting are CPU-bound, so every handler that
//! touches them hands the work to the blocking pool. Training is serialized
//! through `train_lock`; queries never take it.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, warn};

use super::envelope::ApiErrorResponse;
use crate::acquisition::CsvDirectoryLoader;
use crate::config::{ConfigError, ServiceConfig};
use crate::features::FeatureBuilder;
use crate::inference::{InferenceError, InferenceService};
use crate::ml_engine::{BundleKind, UnknownBundleKind};
use crate::storage::{FsArtifactStore, JsonRegistryStore};
use crate::training::{TrainingError, TrainingOrchestrator};
use crate::types::RegistryEntry;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ServiceState {
    pub training: Arc<TrainingOrchestrator>,
    pub inference: Arc<InferenceService>,
    /// Single-writer lock around training runs
    pub train_lock: Arc<Mutex<()>>,
    /// Bundle used by `/feature-importance` without `?model=`
    pub default_model: BundleKind,
    /// `/anomalies` limit when the query omits one
    pub anomaly_limit: usize,
}

impl ServiceState {
    pub fn new(training: TrainingOrchestrator, inference: InferenceService) -> Self {
        Self {
            training: Arc::new(training),
            inference: Arc::new(inference),
            train_lock: Arc::new(Mutex::new(())),
            default_model: BundleKind::Regression,
            anomaly_limit: crate::config::defaults::ANOMALY_LIMIT,
        }
    }

    /// Wire the CSV loader, filesystem stores and both services from config.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let interval = config
            .features
            .interval()
            .map_err(|e| ConfigError::Validation(vec![e.to_string()]))?;
        let default_model: BundleKind = config
            .inference
            .default_model
            .parse()
            .map_err(|e: UnknownBundleKind| ConfigError::Validation(vec![e.to_string()]))?;

        let loader = Arc::new(CsvDirectoryLoader::with_extension(
            &config.data.data_dir,
            &config.data.file_extension,
        ));
        let features = FeatureBuilder::new(loader, interval);
        let artifacts = Arc::new(FsArtifactStore::new(
            &config.artifacts.models_dir,
            config.artifacts.retention,
        ));
        let registry = Arc::new(JsonRegistryStore::new(config.artifacts.registry_path()));

        let training = TrainingOrchestrator::new(
            features.clone(),
            config.training.factory(),
            artifacts.clone(),
            registry.clone(),
        );
        let inference =
            InferenceService::new(features, artifacts, registry).with_trend_points(config.inference.trend_points);

        Ok(Self::new(training, inference)
            .with_default_model(default_model)
            .with_anomaly_limit(config.inference.anomaly_limit))
    }

    pub fn with_default_model(mut self, default_model: BundleKind) -> Self {
        self.default_model = default_model;
        self
    }

    pub fn with_anomaly_limit(mut self, anomaly_limit: usize) -> Self {
        self.anomaly_limit = anomaly_limit;
        self
    }
}

// ============================================================================
// Query / response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ImportanceQuery {
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnomalyQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub parameter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RegistryListing {
    pub models: Vec<RegistryEntry>,
}

// ============================================================================
// Error mapping
// ============================================================================

fn inference_error(e: InferenceError) -> Response {
    match e {
        InferenceError::ModelNotFound(_) | InferenceError::ParameterNotFound(_) => {
            ApiErrorResponse::not_found(e.to_string())
        }
        InferenceError::InvalidPipeline(_) => {
            warn!(error = %e, "Rejected invalid model artifact");
            ApiErrorResponse::bad_request(e.to_string())
        }
        other => {
            error!(error = %other, "Inference failed");
            ApiErrorResponse::internal(other.to_string())
        }
    }
}

fn training_error(e: TrainingError) -> Response {
    error!(error = %e, "Training failed");
    ApiErrorResponse::internal(e.to_string())
}

/// Run `f` on the blocking pool; a panicked task becomes a 500.
async fn blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!(error = %e, "Blocking task failed");
        ApiErrorResponse::internal("worker task failed")
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// POST /train
///
/// The lock is held by the blocking task until the run completes, even if
/// the request itself is dropped first.
pub async fn train(State(state): State<ServiceState>) -> Response {
    let permit = Arc::clone(&state.train_lock).lock_owned().await;
    let training = Arc::clone(&state.training);
    let run = move || {
        let _permit = permit;
        training.train_all()
    };
    match blocking(run).await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => training_error(e),
        Err(resp) => resp,
    }
}

/// GET /summary
pub async fn summary(State(state): State<ServiceState>) -> Response {
    let inference = Arc::clone(&state.inference);
    match blocking(move || inference.summary()).await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => inference_error(e),
        Err(resp) => resp,
    }
}

/// GET /feature-importance?model=
pub async fn feature_importance(
    State(state): State<ServiceState>,
    Query(query): Query<ImportanceQuery>,
) -> Response {
    let model = query.model.unwrap_or_else(|| state.default_model.to_string());
    let inference = Arc::clone(&state.inference);
    match blocking(move || inference.feature_importance(&model)).await {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => inference_error(e),
        Err(resp) => resp,
    }
}

/// GET /anomalies?limit=
pub async fn anomalies(State(state): State<ServiceState>, Query(query): Query<AnomalyQuery>) -> Response {
    let limit = query.limit.unwrap_or(state.anomaly_limit);
    let inference = Arc::clone(&state.inference);
    match blocking(move || inference.anomalies(limit)).await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => inference_error(e),
        Err(resp) => resp,
    }
}

/// GET /trend?parameter=
pub async fn trend(State(state): State<ServiceState>, Query(query): Query<TrendQuery>) -> Response {
    let inference = Arc::clone(&state.inference);
    match blocking(move || inference.trend(query.parameter.as_deref())).await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => inference_error(e),
        Err(resp) => resp,
    }
}

/// GET /registry
pub async fn registry(State(state): State<ServiceState>) -> Response {
    let inference = Arc::clone(&state.inference);
    match blocking(move || inference.registry()).await {
        Ok(Ok(models)) => Json(RegistryListing { models }).into_response(),
        Ok(Err(e)) => inference_error(e),
        Err(resp) => resp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_payload() {
        let Json(body) = tokio_test::block_on(health());
        assert_eq!(body.status, "ok");
    }

    #[test]
    fn test_error_status_mapping() {
        use axum::http::StatusCode;

        let cases = [
            (InferenceError::ModelNotFound("regression".into()), StatusCode::NOT_FOUND),
            (InferenceError::ParameterNotFound("x".into()), StatusCode::NOT_FOUND),
            (InferenceError::InvalidPipeline("bad".into()), StatusCode::BAD_REQUEST),
            (
                InferenceError::Storage(crate::storage::StorageError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(inference_error(err).status(), expected);
        }
    }

    /// Loader that parks inside `load_all_raw` until released.
    struct GatedLoader {
        entered: std::sync::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
        release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl crate::acquisition::RawLoader for GatedLoader {
        fn load_all_raw(&self) -> Result<crate::types::RawDataset, crate::acquisition::LoadError> {
            if let Some(tx) = self.entered.lock().unwrap().take() {
                let _ = tx.send(());
            }
            let _ = self.release.lock().unwrap().recv();
            Ok(crate::types::RawDataset::from_records(Vec::new()))
        }

        fn source_name(&self) -> &str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_train_lock_outlives_dropped_request() {
        use crate::features::AggregationInterval;
        use crate::ml_engine::PipelineFactory;
        use crate::storage::{InMemoryArtifactStore, InMemoryRegistryStore, RetentionPolicy};

        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let loader = Arc::new(GatedLoader {
            entered: std::sync::Mutex::new(Some(entered_tx)),
            release: std::sync::Mutex::new(release_rx),
        });
        let features = FeatureBuilder::new(loader, AggregationInterval::default());
        let artifacts = Arc::new(InMemoryArtifactStore::new(RetentionPolicy::Latest));
        let registry = Arc::new(InMemoryRegistryStore::new());
        let state = ServiceState::new(
            TrainingOrchestrator::new(
                features.clone(),
                PipelineFactory::default(),
                artifacts.clone(),
                registry.clone(),
            ),
            InferenceService::new(features, artifacts, registry),
        );

        let request = tokio::spawn(train(State(state.clone())));
        entered_rx.await.unwrap();
        request.abort();
        assert!(request.await.is_err());

        // Run still in flight: a second writer must not get in
        assert!(state.train_lock.try_lock().is_err());

        release_tx.send(()).unwrap();
        let relocked = tokio::time::timeout(std::time::Duration::from_secs(5), state.train_lock.lock()).await;
        assert!(relocked.is_ok());
    }

    #[test]
    fn test_from_config_rejects_bad_interval() {
        let mut config = ServiceConfig::default();
        config.features.agg_interval = "fortnightly".into();
        assert!(matches!(
            ServiceState::from_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }
}

//! Service configuration: every tunable as a TOML value with environment
//! overrides on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::defaults;
use crate::features::{AggregationInterval, InvalidInterval};
use crate::ml_engine::{BundleKind, PipelineFactory};
use crate::storage::RetentionPolicy;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MSMS_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "msms_config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the raw CSV snapshots
    pub data_dir: PathBuf,
    pub file_extension: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
            file_extension: defaults::FILE_EXTENSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Bucket width, e.g. `5min`, `30s`, `1H`
    pub agg_interval: String,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            agg_interval: defaults::AGG_INTERVAL.to_string(),
        }
    }
}

impl FeaturesConfig {
    pub fn interval(&self) -> Result<AggregationInterval, InvalidInterval> {
        self.agg_interval.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub random_state: u64,
    /// Worker threads for ensemble fitting; 0 = all cores
    pub n_jobs: usize,
    pub regression_trees: usize,
    pub anomaly_trees: usize,
    pub contamination: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            random_state: defaults::RANDOM_STATE,
            n_jobs: defaults::N_JOBS,
            regression_trees: defaults::REGRESSION_TREES,
            anomaly_trees: defaults::ANOMALY_TREES,
            contamination: defaults::CONTAMINATION,
        }
    }
}

impl TrainingConfig {
    pub fn factory(&self) -> PipelineFactory {
        PipelineFactory {
            random_state: self.random_state,
            regression_trees: self.regression_trees,
            anomaly_trees: self.anomaly_trees,
            contamination: self.contamination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub models_dir: PathBuf,
    pub registry_file: PathBuf,
    pub retention: RetentionPolicy,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from(defaults::MODELS_DIR),
            registry_file: PathBuf::from(defaults::REGISTRY_FILE),
            retention: RetentionPolicy::default(),
        }
    }
}

impl ArtifactsConfig {
    /// Registry location; a relative `registry_file` lives in `models_dir`.
    pub fn registry_path(&self) -> PathBuf {
        self.models_dir.join(&self.registry_file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Bundle used by `/feature-importance` when no model is named
    pub default_model: String,
    pub anomaly_limit: usize,
    pub trend_points: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            default_model: defaults::DEFAULT_MODEL.to_string(),
            anomaly_limit: defaults::ANOMALY_LIMIT,
            trend_points: defaults::TREND_POINTS,
        }
    }
}

// ============================================================================
// Top-level config
// ============================================================================

/// Root configuration.
///
/// Load with [`ServiceConfig::load`], which searches:
/// 1. `$MSMS_CONFIG`
/// 2. `./msms_config.toml`
/// 3. Built-in defaults
///
/// and then applies environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub features: FeaturesConfig,
    pub training: TrainingConfig,
    pub artifacts: ArtifactsConfig,
    pub inference: InferenceConfig,
}

impl ServiceConfig {
    /// Load using the standard search order, then apply env overrides.
    pub fn load() -> Self {
        let mut config = Self::search();
        config.apply_env_overrides();
        config
    }

    fn search() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load an explicit TOML file (no search, no env overrides).
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply process environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored
    /// with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: String) -> Option<T> {
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring unparseable environment override");
                    None
                }
            }
        }

        if let Some(host) = lookup("ML_API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("ML_API_PORT").and_then(|v| parsed("ML_API_PORT", v)) {
            self.server.port = port;
        }
        if let Some(interval) = lookup("AGG_INTERVAL") {
            self.features.agg_interval = interval;
        }
        if let Some(n_jobs) = lookup("N_JOBS").and_then(|v| parsed("N_JOBS", v)) {
            self.training.n_jobs = n_jobs;
        }
        if let Some(model) = lookup("DEFAULT_MODEL") {
            self.inference.default_model = model;
        }
        if let Some(dir) = lookup("MSMS_DATA_DIR") {
            self.data.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("MSMS_MODELS_DIR") {
            self.artifacts.models_dir = PathBuf::from(dir);
        }
    }

    /// Check every value, collecting all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".into());
        }
        if let Err(e) = self.features.interval() {
            errors.push(format!("features.agg_interval: {e}"));
        }
        if self.data.file_extension.trim().is_empty() {
            errors.push("data.file_extension must not be empty".into());
        }
        if self.training.regression_trees == 0 {
            errors.push("training.regression_trees must be at least 1".into());
        }
        if self.training.anomaly_trees == 0 {
            errors.push("training.anomaly_trees must be at least 1".into());
        }
        let c = self.training.contamination;
        if c.is_nan() || c <= 0.0 || c > 0.5 {
            errors.push(format!("training.contamination ({c}) must be in (0, 0.5]"));
        }
        if let Err(e) = self.inference.default_model.parse::<BundleKind>() {
            errors.push(format!("inference.default_model: {e}"));
        }
        if self.inference.trend_points == 0 {
            errors.push("inference.trend_points must be at least 1".into());
        }
        if self.artifacts.registry_file.as_os_str().is_empty() {
            errors.push("artifacts.registry_file must not be empty".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

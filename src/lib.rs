//! MSMS-ML: Mine Safety Sensor Modelling
//!
//! Turns raw environmental sensor readings from a mine into a time-bucketed
//! feature table, trains three model bundles on it and answers analytical
//! queries against the latest persisted bundles.
//!
//! ## Architecture
//!
//! - **Acquisition**: raw record snapshots from a CSV directory
//! - **Features**: cleaning, outlier removal, pivot, calendar features, aggregation
//! - **ML Engine**: target selection, preprocessing, linear / forest / isolation models
//! - **Training**: fit, persist and register baseline, regression and anomaly bundles
//! - **Inference**: summary, feature importance, anomaly ranking, trend
//! - **API**: axum HTTP surface over training and inference

pub mod config;
pub mod types;
pub mod acquisition;
pub mod features;
pub mod ml_engine;
pub mod storage;
pub mod training;
pub mod inference;
pub mod api;

pub use config::ServiceConfig;

pub use types::{FeatureMetadata, FeatureTable, Outcome, RawDataset, RawRecord, RegistryEntry};

pub use acquisition::{CsvDirectoryLoader, InMemoryLoader, LoadError, RawLoader};

pub use features::{FeatureBuilder, FeatureError};

pub use ml_engine::{BundleKind, MlError, PipelineBundle, PipelineFactory};

pub use storage::{ArtifactStore, FsArtifactStore, JsonRegistryStore, RegistryStore, StorageError};

pub use training::{TrainingError, TrainingOrchestrator, TrainingReport};

pub use inference::{InferenceError, InferenceService};

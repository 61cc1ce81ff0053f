//! Raw data acquisition module
//!
//! Provides a unified trait for obtaining the combined raw dataset from
//! different sources: a directory of CSV snapshots (production) or a fixed
//! in-memory dataset (tests and embedding callers).

pub mod csv_loader;

pub use csv_loader::{parse_timestamp, CsvDirectoryLoader};

use std::path::PathBuf;
use std::sync::RwLock;

use crate::types::RawDataset;

/// Errors raised while discovering or parsing raw input files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("raw source unavailable: {0}")]
    Unavailable(String),
}

/// Trait abstracting where raw records come from.
///
/// Implementations must be thread-safe: every inference request rebuilds the
/// feature table and may call [`load_all_raw`](RawLoader::load_all_raw)
/// concurrently with a training run.
pub trait RawLoader: Send + Sync {
    /// Load and combine every available raw record.
    ///
    /// Returns an empty dataset (not an error) when there is nothing to load.
    fn load_all_raw(&self) -> Result<RawDataset, LoadError>;

    /// Human-readable name for logging (e.g. "csv-dir", "in-memory").
    fn source_name(&self) -> &str;
}

/// Loader over a dataset held in memory.
///
/// The dataset can be replaced at runtime, which lets tests simulate new
/// snapshots arriving between training and inference calls.
#[derive(Debug, Default)]
pub struct InMemoryLoader {
    dataset: RwLock<RawDataset>,
}

impl InMemoryLoader {
    pub fn new(dataset: RawDataset) -> Self {
        Self {
            dataset: RwLock::new(dataset),
        }
    }

    /// Swap in a new dataset for subsequent loads.
    pub fn replace(&self, dataset: RawDataset) -> Result<(), LoadError> {
        let mut guard = self
            .dataset
            .write()
            .map_err(|e| LoadError::Unavailable(e.to_string()))?;
        *guard = dataset;
        Ok(())
    }
}

impl RawLoader for InMemoryLoader {
    fn load_all_raw(&self) -> Result<RawDataset, LoadError> {
        let guard = self
            .dataset
            .read()
            .map_err(|e| LoadError::Unavailable(e.to_string()))?;
        Ok(guard.clone())
    }

    fn source_name(&self) -> &str {
        "in-memory"
    }
}

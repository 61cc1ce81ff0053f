//! Artifact Store: one serialized pipeline bundle per kind.
//!
//! The slot `<kind>.json` always holds the latest bundle of that kind. Under
//! the `versioned` retention policy every run additionally keeps
//! `<kind>-<run_id>.json`, and that is the name the registry records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{write_atomic, StorageError};
use crate::ml_engine::{BundleKind, PipelineBundle};

/// Whether past runs keep their own artifact files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// One slot per kind, overwritten every run
    #[default]
    Latest,
    /// Latest slot plus one immutable file per run
    Versioned,
}

impl RetentionPolicy {
    /// File name the registry should reference for this run.
    pub fn reference_name(&self, kind: BundleKind, run_id: &str) -> String {
        match self {
            Self::Latest => slot_name(kind),
            Self::Versioned => format!("{}-{}.json", kind.as_str(), run_id),
        }
    }
}

pub fn slot_name(kind: BundleKind) -> String {
    format!("{}.json", kind.as_str())
}

/// Trait for pluggable artifact backends.
///
/// Implementations must be thread-safe: inference loads bundles while a
/// training run may be saving new ones.
pub trait ArtifactStore: Send + Sync {
    /// Persist `bundle` as the latest artifact of `kind`; returns the file
    /// reference to record in the registry.
    fn save(&self, kind: BundleKind, bundle: &PipelineBundle, run_id: &str) -> Result<String, StorageError>;

    /// Load the latest artifact of `kind`.
    fn load(&self, kind: BundleKind) -> Result<PipelineBundle, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Filesystem backend
// ============================================================================

/// JSON artifacts in a models directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
    retention: RetentionPolicy,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, retention: RetentionPolicy) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: BundleKind) -> PathBuf {
        self.dir.join(slot_name(kind))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self, kind: BundleKind, bundle: &PipelineBundle, run_id: &str) -> Result<String, StorageError> {
        let bytes = serde_json::to_vec(bundle).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let reference = self.retention.reference_name(kind, run_id);
        if self.retention == RetentionPolicy::Versioned {
            write_atomic(&self.dir.join(&reference), &bytes)?;
        }
        let slot = self.path_for(kind);
        write_atomic(&slot, &bytes)?;

        info!(kind = %kind, path = %slot.display(), bytes = bytes.len(), "Saved model artifact");
        Ok(reference)
    }

    fn load(&self, kind: BundleKind) -> Result<PipelineBundle, StorageError> {
        let path = self.path_for(kind);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!("model artifact '{kind}'")));
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let bundle = serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
            what: format!("model artifact '{kind}'"),
            reason: e.to_string(),
        })?;
        debug!(kind = %kind, path = %path.display(), "Loaded model artifact");
        Ok(bundle)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory artifacts for tests. Not durable.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    files: RwLock<HashMap<String, PipelineBundle>>,
    retention: RetentionPolicy,
}

impl InMemoryArtifactStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Every stored file name, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn save(&self, kind: BundleKind, bundle: &PipelineBundle, run_id: &str) -> Result<String, StorageError> {
        let mut files = self.files.write().map_err(|e| StorageError::Backend(e.to_string()))?;
        let reference = self.retention.reference_name(kind, run_id);
        files.insert(reference.clone(), bundle.clone());
        files.insert(slot_name(kind), bundle.clone());
        Ok(reference)
    }

    fn load(&self, kind: BundleKind) -> Result<PipelineBundle, StorageError> {
        let files = self.files.read().map_err(|e| StorageError::Backend(e.to_string()))?;
        files
            .get(&slot_name(kind))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("model artifact '{kind}'")))
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

//! Registry Store: append-only log of completed training runs.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{write_atomic, StorageError};
use crate::types::RegistryEntry;

/// Trait for pluggable registry backends.
pub trait RegistryStore: Send + Sync {
    /// Append one entry; earlier entries are never modified.
    fn append(&self, entry: RegistryEntry) -> Result<(), StorageError>;

    /// All entries in append order.
    fn read_all(&self) -> Result<Vec<RegistryEntry>, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// On-disk document shape: `{"models": [entry, ...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    models: Vec<RegistryEntry>,
}

/// Registry kept as a single JSON document, rewritten atomically on append.
#[derive(Debug)]
pub struct JsonRegistryStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document; a missing file is empty and an unreadable one is
    /// logged and treated as empty so later runs can still record history.
    fn read_document(&self) -> Result<RegistryDocument, StorageError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RegistryDocument::default()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        match serde_json::from_slice(&bytes) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed reading registry, starting new"
                );
                Ok(RegistryDocument::default())
            }
        }
    }
}

impl RegistryStore for JsonRegistryStore {
    fn append(&self, entry: RegistryEntry) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut doc = self.read_document()?;
        doc.models.push(entry);
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| StorageError::Serialization(e.to_string()))?;
        write_atomic(&self.path, &bytes)?;

        info!(path = %self.path.display(), entries = doc.models.len(), "Registry updated");
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<RegistryEntry>, StorageError> {
        Ok(self.read_document()?.models)
    }

    fn backend_name(&self) -> &'static str {
        "json-file"
    }
}

/// In-memory registry for tests. Not durable.
#[derive(Debug, Default)]
pub struct InMemoryRegistryStore {
    entries: RwLock<Vec<RegistryEntry>>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for InMemoryRegistryStore {
    fn append(&self, entry: RegistryEntry) -> Result<(), StorageError> {
        self.entries
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .push(entry);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<RegistryEntry>, StorageError> {
        let entries = self.entries.read().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(entries.clone())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureMetadata, ModelFiles};
    use chrono::{Duration, TimeZone, Utc};

    fn entry(minute: i64) -> RegistryEntry {
        RegistryEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            models: ModelFiles {
                baseline: "baseline.json".into(),
                regression: "regression.json".into(),
                anomaly: "anomaly.json".into(),
            },
            metadata: FeatureMetadata {
                rows: 10,
                columns: 16,
                agg_interval: "5min".into(),
            },
        }
    }

    #[test]
    fn test_json_registry_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRegistryStore::new(dir.path().join("registry.json"));
        assert!(store.read_all().unwrap().is_empty());

        store.append(entry(0)).unwrap();
        let first = store.read_all().unwrap();
        store.append(entry(5)).unwrap();
        store.append(entry(10)).unwrap();

        let all = store.read_all().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], first[0]);
        assert!(all.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["models"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_corrupt_registry_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, b"not json at all").unwrap();

        let store = JsonRegistryStore::new(&path);
        assert!(store.read_all().unwrap().is_empty());
        store.append(entry(0)).unwrap();
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_in_memory_registry() {
        let store = InMemoryRegistryStore::new();
        store.append(entry(1)).unwrap();
        store.append(entry(2)).unwrap();
        assert_eq!(store.read_all().unwrap().len(), 2);
    }
}

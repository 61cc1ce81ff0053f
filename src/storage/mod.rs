//! Persistent state: model artifacts and the training registry
//!
//! Both stores are traits so the orchestrator and inference layer can run
//! against the filesystem in production and against memory in tests:
//! - `artifacts`: one serialized [`PipelineBundle`](crate::ml_engine::PipelineBundle) per bundle kind
//! - `registry`: append-only log of completed training runs
//!
//! Files are replaced with a temp-file-then-rename write so readers see
//! either the previous or the new content, never a partial file.

pub mod artifacts;
pub mod registry;

pub use artifacts::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore, RetentionPolicy};
pub use registry::{InMemoryRegistryStore, JsonRegistryStore, RegistryStore};

use std::io;
use std::path::{Path, PathBuf};

/// Storage errors shared by the artifact and registry stores.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("corrupt {what}: {reason}")]
    Corrupt { what: String, reason: String },
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes).map_err(|e| StorageError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        StorageError::io(path, e)
    })
}

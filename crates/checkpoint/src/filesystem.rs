//! Filesystem-based checkpoint storage implementation.

use anyhow::Result;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use sync_core::PersistenceError;

use crate::store::{CheckpointStore, Snapshot};

/// Filesystem implementation of CheckpointStore trait.
///
/// Stores the snapshot as one JSON object mapping checkpoint key to cursor:
///
/// ```json
/// {
///     "films": "2021-06-16T20:14:09.221855Z",
///     "persons": "2021-06-16T20:14:09.221855Z"
/// }
/// ```
///
/// The file is rewritten on every save through a temporary file in the same
/// directory, so a crash never leaves a truncated snapshot behind.
pub struct FilesystemStore {
    path: Option<PathBuf>,
}

impl FilesystemStore {
    /// Create a new FilesystemStore writing to the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A store without a file: loads as empty, refuses to save.
    pub fn unspecified() -> Self {
        Self { path: None }
    }

    /// Get the file path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn load(&self) -> Result<Snapshot> {
        let Some(path) = &self.path else {
            return Ok(Snapshot::new());
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    "No checkpoint file at {}, starting from default cursors",
                    path.display()
                );
                return Ok(Snapshot::new());
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: path.clone(),
                    source,
                }
                .into())
            }
        };

        if content.trim().is_empty() {
            return Ok(Snapshot::new());
        }

        // `null` and `{}` both mean "nothing checkpointed yet"
        let snapshot: Option<Snapshot> =
            serde_json::from_str(&content).map_err(|source| PersistenceError::Corrupt {
                path: path.clone(),
                source,
            })?;

        Ok(snapshot.unwrap_or_default())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.path.as_ref().ok_or(PersistenceError::PathNotSpecified)?;
        let write_error = |source: std::io::Error| PersistenceError::Write {
            path: path.clone(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(write_error)?;

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| write_error(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
        tmp.write_all(json.as_bytes()).map_err(write_error)?;
        tmp.as_file().sync_all().map_err(write_error)?;
        tmp.persist(path).map_err(|e| write_error(e.error))?;

        tracing::trace!("Saved checkpoint snapshot to {}", path.display());
        Ok(())
    }
}

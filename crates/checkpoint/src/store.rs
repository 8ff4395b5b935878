//! Checkpoint storage trait and snapshot type.
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! persistence of the cursor snapshot.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use sync_core::Cursor;

/// Every named cursor of the sync, keyed by checkpoint key
/// (`films`, `persons`, `persons_film`, ...).
pub type Snapshot = BTreeMap<String, Cursor>;

/// Trait for checkpoint storage operations.
///
/// This trait abstracts the storage backend for the cursor snapshot,
/// allowing the same tracking logic to work with:
/// - Filesystem storage (`FilesystemStore`)
/// - SurrealDB v2 (`Surreal2Store`)
/// - Process memory (`MemoryStore`, for tests)
///
/// Failures are reported as [`sync_core::PersistenceError`] wrapped in
/// `anyhow::Error`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the last persisted snapshot.
    ///
    /// Returns an empty snapshot if nothing has been persisted yet.
    async fn load(&self) -> Result<Snapshot>;

    /// Durably replace the persisted snapshot.
    ///
    /// Returns only after the snapshot is stored.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

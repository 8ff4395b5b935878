//! Watermark tracking over a checkpoint store.

use anyhow::Result;
use sync_core::Cursor;

use crate::store::{CheckpointStore, Snapshot};

/// In-memory view of every cursor, written through to a [`CheckpointStore`].
///
/// The snapshot is loaded once when the tracker is created. Each mutation
/// saves the *full* snapshot before returning, so the persisted state never
/// lags more than the one update that is in flight. If the save fails the
/// in-memory snapshot is rolled back and the error is returned.
pub struct WatermarkTracker {
    store: Box<dyn CheckpointStore>,
    snapshot: Snapshot,
}

impl WatermarkTracker {
    /// Load the persisted snapshot from `store`.
    pub async fn load(store: impl CheckpointStore + 'static) -> Result<Self> {
        Self::load_boxed(Box::new(store)).await
    }

    pub async fn load_boxed(store: Box<dyn CheckpointStore>) -> Result<Self> {
        let snapshot = store.load().await?;
        tracing::debug!("Loaded {} checkpoint cursors", snapshot.len());
        Ok(Self { store, snapshot })
    }

    pub fn get(&self, key: &str) -> Option<Cursor> {
        self.snapshot.get(key).copied()
    }

    /// The cursor for `key`, or `default` if it was never set.
    pub fn get_or(&self, key: &str, default: Cursor) -> Cursor {
        self.get(key).unwrap_or(default)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Set `key` to `cursor` and persist the snapshot.
    pub async fn set(&mut self, key: &str, cursor: Cursor) -> Result<()> {
        if let Some(current) = self.get(key) {
            if cursor < current {
                tracing::warn!("Cursor '{key}' moves backwards from {current} to {cursor}");
            }
        }

        let previous = self.snapshot.clone();
        self.snapshot.insert(key.to_string(), cursor);
        self.persist(previous).await
    }

    /// Set `key` to `cursor` and drop `clear` in a single snapshot write.
    ///
    /// Used when a dependent part finishes its owner scan: the primary cursor
    /// moves forward and the scan cursor starts over for the next scan.
    pub async fn complete_scan(&mut self, key: &str, cursor: Cursor, clear: &str) -> Result<()> {
        let previous = self.snapshot.clone();
        self.snapshot.insert(key.to_string(), cursor);
        self.snapshot.remove(clear);
        self.persist(previous).await
    }

    /// Remove the given cursors and persist the snapshot.
    ///
    /// Returns the number of cursors that were actually present.
    pub async fn remove(&mut self, keys: &[&str]) -> Result<usize> {
        let previous = self.snapshot.clone();
        let removed = keys
            .iter()
            .filter(|key| self.snapshot.remove(**key).is_some())
            .count();
        self.persist(previous).await?;
        Ok(removed)
    }

    async fn persist(&mut self, previous: Snapshot) -> Result<()> {
        if let Err(e) = self.store.save(&self.snapshot).await {
            self.snapshot = previous;
            return Err(e);
        }
        Ok(())
    }
}

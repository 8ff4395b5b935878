//! In-memory checkpoint storage.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use sync_core::PersistenceError;

use crate::store::{CheckpointStore, Snapshot};

#[derive(Default)]
struct MemoryState {
    persisted: Option<Snapshot>,
    saves: usize,
    fail_saves: bool,
}

/// CheckpointStore kept in process memory.
///
/// Clones share the same state, so a test can hand one clone to a
/// [`crate::WatermarkTracker`] and inspect what was persisted through
/// another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `snapshot`, as if persisted by an earlier run.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::default();
        store.lock().persisted = Some(snapshot);
        store
    }

    /// The last saved snapshot (empty if never saved).
    pub fn persisted(&self) -> Snapshot {
        self.lock().persisted.clone().unwrap_or_default()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    /// Make subsequent saves fail with [`PersistenceError::Unavailable`].
    pub fn fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self) -> Result<Snapshot> {
        Ok(self.persisted())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(PersistenceError::Unavailable("memory store is read-only".to_string()).into());
        }
        state.persisted = Some(snapshot.clone());
        state.saves += 1;
        Ok(())
    }
}

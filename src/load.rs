//! Load stage: bulk writes into the index.

use anyhow::Result;
use async_trait::async_trait;
use index_sink::{ActionOutcome, IndexSchema, IndexSink};
use sync_core::{ActionChunk, SinkWriteError};
use tracing::{debug, info, warn};

/// What one chunk write did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub written: usize,
    pub skipped: usize,
}

/// Push side of the load stage.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Create the storage object if it does not exist yet. Idempotent.
    async fn ensure_storage_exists(&self) -> Result<()>;

    /// Write one chunk as a single bulk call.
    async fn write_chunk(&self, chunk: ActionChunk) -> Result<ChunkReport>;
}

/// The storage object documents are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    pub name: String,
    pub schema: IndexSchema,
}

impl IndexTarget {
    /// A target using the built-in movies schema.
    pub fn builtin(name: impl Into<String>) -> Self {
        let name = name.into();
        let schema = IndexSchema::builtin(&name);
        Self { name, schema }
    }
}

/// [`ChunkSink`] over an [`IndexSink`].
///
/// A chunk in which any action failed fails as a whole with a
/// [`SinkWriteError`]; the actions are idempotent, so the retry of the run
/// may resend the ones that did succeed. Failures are not retried here.
pub struct SinkWriter<S> {
    sink: S,
    target: IndexTarget,
}

impl<S: IndexSink> SinkWriter<S> {
    pub fn new(sink: S, target: IndexTarget) -> Self {
        Self { sink, target }
    }

    pub fn target(&self) -> &IndexTarget {
        &self.target
    }
}

#[async_trait]
impl<S: IndexSink> ChunkSink for SinkWriter<S> {
    async fn ensure_storage_exists(&self) -> Result<()> {
        let name = &self.target.name;
        if self.sink.index_exists(name).await? {
            debug!("Index '{}' already exists", name);
            return Ok(());
        }
        info!("Index '{}' does not exist, creating it", name);
        self.sink.create_index(name, &self.target.schema).await
    }

    async fn write_chunk(&self, chunk: ActionChunk) -> Result<ChunkReport> {
        let name = &self.target.name;
        let outcomes =
            self.sink
                .bulk(name, chunk.actions())
                .await
                .map_err(|e| SinkWriteError {
                    index: name.clone(),
                    failed: chunk.len(),
                    total: chunk.len(),
                    first_reason: format!("{e:#}"),
                })?;

        let mut report = ChunkReport::default();
        let mut failed = 0;
        let mut first_reason = None;
        for (action, outcome) in chunk.actions().iter().zip(&outcomes) {
            match outcome {
                ActionOutcome::Written => report.written += 1,
                ActionOutcome::Skipped { reason } => {
                    warn!("Skipped update of '{}': {}", action.id(), reason);
                    report.skipped += 1;
                }
                ActionOutcome::Failed { reason } => {
                    failed += 1;
                    first_reason.get_or_insert_with(|| reason.clone());
                }
            }
        }
        if outcomes.len() != chunk.len() {
            failed += chunk.len().abs_diff(outcomes.len());
            first_reason.get_or_insert_with(|| {
                format!(
                    "sink reported {} outcomes for {} actions",
                    outcomes.len(),
                    chunk.len()
                )
            });
        }

        if let Some(first_reason) = first_reason {
            return Err(SinkWriteError {
                index: name.clone(),
                failed,
                total: chunk.len(),
                first_reason,
            }
            .into());
        }

        debug!(
            "Wrote chunk of {} actions to '{}' ({} skipped)",
            chunk.len(),
            name,
            report.skipped
        );
        Ok(report)
    }
}

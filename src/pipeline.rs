//! One pipeline run: extract → transform → rechunk → load for every part.

use std::time::Instant;

use anyhow::Result;
use checkpoint::WatermarkTracker;
use sync_core::{Part, RowSource};
use tracing::info;

use crate::extract::{ExtractConfig, PartExtractor};
use crate::load::ChunkSink;
use crate::rechunk::Rechunker;
use crate::transform::DocumentTransformer;

/// Everything a run needs to know besides its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Parts to process, in order.
    pub parts: Vec<Part>,
    pub extract: ExtractConfig,
    /// Actions per bulk write.
    pub chunk_size: usize,
}

/// What a run did for one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSummary {
    pub part: Part,
    pub actions: usize,
    pub chunks: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub parts: Vec<PartSummary>,
}

impl RunSummary {
    pub fn total_actions(&self) -> usize {
        self.parts.iter().map(|p| p.actions).sum()
    }
}

/// Stream one part through all stages.
///
/// Chunks are written in extraction order. The part's cursors advance as
/// batches are pulled, so everything before the batch in flight is
/// checkpointed when an error stops the part.
pub async fn run_part<S, K>(
    source: &mut S,
    tracker: &mut WatermarkTracker,
    sink: &K,
    part: Part,
    config: &PipelineConfig,
) -> Result<PartSummary>
where
    S: RowSource,
    K: ChunkSink,
{
    let batches = PartExtractor::new(source, tracker, config.extract.clone()).extract(part);
    let transformer = DocumentTransformer::new(part, batches);
    let mut chunks = Rechunker::new(transformer, config.chunk_size);

    let mut summary = PartSummary {
        part,
        actions: 0,
        chunks: 0,
        skipped: 0,
    };
    while let Some(chunk) = chunks.next_chunk().await {
        let chunk = chunk?;
        let len = chunk.len();
        let report = sink.write_chunk(chunk).await?;
        summary.actions += len;
        summary.chunks += 1;
        summary.skipped += report.skipped;
    }
    Ok(summary)
}

/// Process every configured part, in order.
///
/// The storage object is ensured once up front. Parts are independent: each
/// keeps its own cursors, and an error in one part stops the run without
/// undoing what earlier parts wrote.
pub async fn run_parts<S, K>(
    source: &mut S,
    tracker: &mut WatermarkTracker,
    sink: &K,
    config: &PipelineConfig,
) -> Result<RunSummary>
where
    S: RowSource,
    K: ChunkSink,
{
    sink.ensure_storage_exists().await?;

    let mut summary = RunSummary::default();
    for &part in &config.parts {
        let started = Instant::now();
        let part_summary = run_part(source, tracker, sink, part, config).await?;
        info!(
            "Part '{}' done: {} actions in {} chunks ({} skipped) in {:?}",
            part,
            part_summary.actions,
            part_summary.chunks,
            part_summary.skipped,
            started.elapsed()
        );
        summary.parts.push(part_summary);
    }
    Ok(summary)
}

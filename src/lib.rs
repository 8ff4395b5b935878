//! SurrealIndexSync Library
//!
//! Incremental sync of the PostgreSQL movies catalogue into a SurrealDB table
//! with full-text search indexes.
//!
//! # Features
//!
//! - Change detection by `updated_at`: only rows changed since the last run
//!   are read
//! - Checkpointed cursors: every part resumes where the previous run stopped
//! - Bounded memory: rows stream through the stages page by page
//! - Idempotent writes: replaying a batch leaves the index unchanged
//! - Whole-run retry with exponential backoff
//!
//! # Pipeline
//!
//! ```text
//! Retrier
//!   └─ run_parts (per part)
//!        PartExtractor → DocumentTransformer → Rechunker → SinkWriter
//!        (RowBatch)      (WriteAction)         (ActionChunk)
//! ```
//!
//! # Parts
//!
//! - `films` - whole film documents, keyed by the film cursor
//! - `persons` - person fields of films linked to changed persons
//! - `genres` - genre names of films linked to changed genres
//!
//! # CLI Usage
//!
//! ```bash
//! # Bootstrap an empty index with films only, then stop
//! surreal-index-sync run --init --once
//!
//! # Sync every part every ten minutes
//! surreal-index-sync run --freq 10m
//!
//! # Inspect or reset the cursors
//! surreal-index-sync state show
//! surreal-index-sync state reset --part persons
//! ```

pub mod config;
pub mod documents;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod rechunk;
pub mod retry;
pub mod sync;
pub mod testing;
pub mod transform;

pub use config::{PipelineOpts, PostgresOpts, RetryOpts, StateOpts, SurrealOpts};
pub use extract::{BatchSource, ExtractConfig, PartExtractor};
pub use load::{ChunkReport, ChunkSink, IndexTarget, SinkWriter};
pub use pipeline::{run_part, run_parts, PartSummary, PipelineConfig, RunSummary};
pub use rechunk::Rechunker;
pub use retry::{Retrier, RetryPolicy, RunState};
pub use sync::{open_tracker, run_once, run_scheduled, SyncSettings};
pub use transform::{ActionSource, DocumentTransformer};

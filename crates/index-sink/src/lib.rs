//! Index sink abstraction.
//!
//! This crate defines the `IndexSink` trait the load stage writes through,
//! along with two implementations:
//!
//! - [`SurrealIndexSink`] - SurrealDB v2 tables with full-text indexes
//! - [`MemorySink`] - shared in-memory maps for tests
//!
//! The trait speaks in [`sync_core::WriteAction`]s so the pipeline never sees
//! SDK types.

mod memory;
mod surreal2;
mod traits;

pub use memory::MemorySink;
pub use surreal2::SurrealIndexSink;
pub use traits::{ActionOutcome, IndexSchema, IndexSink};

//! Core types for the surreal-index-sync pipeline.
//!
//! This crate provides the foundational types shared by every stage and
//! every collaborator:
//!
//! - [`Cursor`] - Change-timestamp watermark, persisted as a string
//! - [`Part`] - Independently checkpointed change stream
//! - [`SourceRow`], [`RowBatch`] - Rows as produced by the query layer
//! - [`WriteAction`], [`ActionChunk`] - Operations sent to the index sink
//! - [`RowSource`] - Contract implemented by the query layer
//! - [`error`] - Typed failures carried through `anyhow::Error`
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── checkpoint          (stores cursors keyed by part)
//!    ├─── postgresql-source   (implements RowSource)
//!    ├─── index-sink          (consumes WriteAction)
//!    └─── surreal-index-sync  (extract → transform → rechunk → load)
//! ```

mod action;
mod cursor;
pub mod error;
mod part;
mod row;
mod source;

pub use action::{ActionChunk, WriteAction};
pub use cursor::{Cursor, CursorParseError};
pub use error::{PersistenceError, QueryError, SchemaValidationError, SinkWriteError};
pub use part::{Part, Relation, UnknownPartError};
pub use row::{RowBatch, Scan, ScanPosition, SourceRow};
pub use source::RowSource;

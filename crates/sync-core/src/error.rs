//! Error taxonomy of the sync pipeline.
//!
//! Stages return `anyhow::Result` and wrap one of these types, so the retry
//! loop can treat every failure uniformly while callers and tests can still
//! `downcast_ref` to the concrete kind.

use crate::Part;
use std::path::PathBuf;

/// The checkpoint store could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// No checkpoint path was configured.
    #[error("The checkpoint file path was not specified")]
    PathNotSpecified,

    #[error("Failed to read checkpoint file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write checkpoint file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Checkpoint file {} is not a valid cursor map: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The backing medium refused the write for another reason.
    #[error("Checkpoint storage unavailable: {0}")]
    Unavailable(String),
}

/// A source row could not be coerced into the part's document shape.
#[derive(Debug, thiserror::Error)]
#[error("Row '{row_id}' of part '{part}' does not match the document schema: {reason}")]
pub struct SchemaValidationError {
    pub part: Part,
    pub row_id: String,
    pub reason: String,
}

/// A bulk write was rejected by the sink, in whole or in part.
#[derive(Debug, thiserror::Error)]
#[error("Bulk write to '{index}' failed for {failed} of {total} actions: {first_reason}")]
pub struct SinkWriteError {
    pub index: String,
    pub failed: usize,
    pub total: usize,
    pub first_reason: String,
}

/// The query layer failed to produce rows.
#[derive(Debug, thiserror::Error)]
#[error("Query '{query}' failed: {reason}")]
pub struct QueryError {
    pub query: String,
    pub reason: String,
}

impl QueryError {
    pub fn new(query: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            query: query.into(),
            reason: reason.to_string(),
        }
    }
}

//! Rows as they come out of the query layer.

use crate::{Cursor, Part, Relation};
use serde_json::{Map, Value};

/// One row returned by a [`crate::RowSource`].
///
/// `id` and `changed_at` drive pagination and checkpointing; `data` carries
/// the raw columns for the transformer to validate.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub id: String,
    pub changed_at: Cursor,
    pub data: Map<String, Value>,
}

impl SourceRow {
    pub fn new(id: impl Into<String>, changed_at: Cursor, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            changed_at,
            data,
        }
    }

    /// A row carrying only its identity, as returned by id scans.
    pub fn key(id: impl Into<String>, changed_at: Cursor) -> Self {
        Self::new(id, changed_at, Map::new())
    }
}

/// Keyset position of a paged scan: rows strictly after `(after, after_id)`.
///
/// `after_id` is `None` when a scan starts from a persisted cursor, in which
/// case only rows with `changed_at > after` qualify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPosition {
    pub after: Cursor,
    pub after_id: Option<String>,
}

impl ScanPosition {
    pub fn start(after: Cursor) -> Self {
        Self {
            after,
            after_id: None,
        }
    }

    /// Position immediately past `row`.
    pub fn past(row: &SourceRow) -> Self {
        Self {
            after: row.changed_at,
            after_id: Some(row.id.clone()),
        }
    }
}

/// What a paged change query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan<'a> {
    /// Fully denormalized film rows.
    Root,
    /// Ids of linked entities (persons, genres) changed after the position.
    Linked(Relation),
    /// Ids of films linked to `linked_ids` whose own timestamp is older than
    /// the linked entity's change.
    Owners {
        relation: Relation,
        linked_ids: &'a [String],
    },
}

/// One page of rows handed from the extractor to the transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub part: Part,
    pub rows: Vec<SourceRow>,
}

impl RowBatch {
    pub fn new(part: Part, rows: Vec<SourceRow>) -> Self {
        Self { part, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Largest change timestamp in the batch.
    pub fn max_changed_at(&self) -> Option<Cursor> {
        self.rows.iter().map(|row| row.changed_at).max()
    }
}

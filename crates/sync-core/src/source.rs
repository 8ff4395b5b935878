//! Query-layer contract.

use crate::{Relation, Scan, ScanPosition, SourceRow};
use anyhow::Result;
use async_trait::async_trait;

/// Trait for the relational side of the sync.
///
/// Implementations issue the change-detection queries; the extractor only
/// decides which scan to run and where to resume it.
///
/// Pages are ordered by `(changed_at, id)` ascending and never contain a row
/// at or before `position`. An empty page means the scan is exhausted.
#[async_trait]
pub trait RowSource: Send {
    /// Fetch at most `limit` rows of `scan` strictly after `position`.
    async fn changed_since(
        &mut self,
        scan: Scan<'_>,
        position: &ScanPosition,
        limit: usize,
    ) -> Result<Vec<SourceRow>>;

    /// Fetch the denormalized rows a dependent part writes for the given
    /// film ids.
    async fn rows_by_id(&mut self, relation: Relation, ids: &[String]) -> Result<Vec<SourceRow>>;
}

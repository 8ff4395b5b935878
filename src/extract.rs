//! Extract stage: checkpointed change streams, one per part.
//!
//! A stream yields pages of rows newer than its part's watermark. The
//! watermark only moves to a row's timestamp once the batch holding that row
//! has been handed off *and* the consumer comes back for the next batch, so
//! a batch that fails further down the pipeline is extracted again on the
//! next run.
//!
//! Persisted cursors are resumed with a strict `changed_at > cursor`, so a
//! timestamp is only persisted once every row carrying it has been handed
//! off. When the next page starts with the same timestamp as the last one,
//! the cursor stops just below it and the tied rows are extracted again on
//! resume.

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::WatermarkTracker;
use sync_core::{Cursor, Part, Relation, RowBatch, RowSource, Scan, ScanPosition, SourceRow};
use tracing::{debug, info};

/// Pull side of the extract stage.
#[async_trait]
pub trait BatchSource: Send {
    /// The next batch, an error, or `None` once the stream is exhausted.
    async fn next_batch(&mut self) -> Option<Result<RowBatch>>;
}

#[async_trait]
impl<T: BatchSource + ?Sized> BatchSource for Box<T> {
    async fn next_batch(&mut self) -> Option<Result<RowBatch>> {
        (**self).next_batch().await
    }
}

/// Extraction settings shared by every part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Maximum rows per query page.
    pub page_size: usize,
    /// Cursor used for parts that have never been checkpointed.
    pub default_cursor: Cursor,
}

/// Cursor advance owed for the page handed off last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingAdvance {
    last: Cursor,
    /// Largest timestamp of the page below `last`.
    below_last: Option<Cursor>,
}

impl PendingAdvance {
    /// Rows are ordered by `(changed_at, id)`.
    fn of(rows: &[SourceRow]) -> Option<Self> {
        let last = rows.last()?.changed_at;
        let below_last = rows
            .iter()
            .rev()
            .map(|row| row.changed_at)
            .find(|changed_at| *changed_at < last);
        Some(Self { last, below_last })
    }

    /// Cursor that may be persisted once `next` is the first row of the
    /// following page, or `None` when nothing can be persisted yet.
    fn resolve(self, next: Option<&SourceRow>) -> Option<Cursor> {
        match next {
            Some(row) if row.changed_at <= self.last => self.below_last,
            _ => Some(self.last),
        }
    }
}

async fn advance(
    tracker: &mut WatermarkTracker,
    key: &str,
    pending: Option<PendingAdvance>,
    next: Option<&SourceRow>,
) -> Result<()> {
    let Some(pending) = pending else {
        return Ok(());
    };
    match pending.resolve(next) {
        Some(cursor) => {
            tracker.set(key, cursor).await?;
            debug!("Advanced cursor '{}' to {}", key, cursor);
        }
        None => debug!(
            "Holding cursor '{}': rows at {} continue on the next page",
            key, pending.last
        ),
    }
    Ok(())
}

/// Builds the change stream of a part over a source and a tracker.
pub struct PartExtractor<'a, S: RowSource> {
    source: &'a mut S,
    tracker: &'a mut WatermarkTracker,
    config: ExtractConfig,
}

impl<'a, S: RowSource + 'a> PartExtractor<'a, S> {
    pub fn new(source: &'a mut S, tracker: &'a mut WatermarkTracker, config: ExtractConfig) -> Self {
        Self {
            source,
            tracker,
            config,
        }
    }

    pub fn extract(self, part: Part) -> Box<dyn BatchSource + 'a> {
        match part {
            Part::Films => Box::new(RootPartStream::new(self.source, self.tracker, self.config)),
            Part::Persons => Box::new(LinkedPartStream::new(
                self.source,
                self.tracker,
                self.config,
                Relation::Persons,
            )),
            Part::Genres => Box::new(LinkedPartStream::new(
                self.source,
                self.tracker,
                self.config,
                Relation::Genres,
            )),
        }
    }
}

/// Film documents changed after the `films` cursor.
struct RootPartStream<'a, S> {
    source: &'a mut S,
    tracker: &'a mut WatermarkTracker,
    page_size: usize,
    position: ScanPosition,
    /// Advance for the batch handed off last, committed on the next pull.
    pending: Option<PendingAdvance>,
    /// The last page was short, so the next query would come back empty.
    exhausted: bool,
    done: bool,
}

impl<'a, S: RowSource> RootPartStream<'a, S> {
    fn new(source: &'a mut S, tracker: &'a mut WatermarkTracker, config: ExtractConfig) -> Self {
        let key = Part::Films.cursor_key();
        let after = tracker.get_or(key, config.default_cursor);
        info!("Extracting part 'films' changed after {}", after);
        Self {
            source,
            tracker,
            page_size: config.page_size,
            position: ScanPosition::start(after),
            pending: None,
            exhausted: false,
            done: false,
        }
    }

    async fn step(&mut self) -> Result<Option<RowBatch>> {
        let rows = if self.exhausted {
            Vec::new()
        } else {
            self.source
                .changed_since(Scan::Root, &self.position, self.page_size)
                .await?
        };
        advance(
            self.tracker,
            Part::Films.cursor_key(),
            self.pending.take(),
            rows.first(),
        )
        .await?;

        let Some(last) = rows.last() else {
            return Ok(None);
        };
        self.position = ScanPosition::past(last);
        self.exhausted = rows.len() < self.page_size;
        self.pending = PendingAdvance::of(&rows);

        let batch = RowBatch::new(Part::Films, rows);
        debug!("Extracted {} rows of part 'films'", batch.len());
        Ok(Some(batch))
    }
}

#[async_trait]
impl<S: RowSource> BatchSource for RootPartStream<'_, S> {
    async fn next_batch(&mut self) -> Option<Result<RowBatch>> {
        if self.done {
            return None;
        }
        let next = self.step().await.transpose();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

/// Where a dependent part is in its two-level scan.
enum LinkedPhase {
    /// Linked entities not collected yet.
    Start,
    /// Paging through films linked to the collected entities.
    Owners {
        linked_ids: Vec<String>,
        linked_max: Cursor,
        position: ScanPosition,
        exhausted: bool,
    },
    Done,
}

/// Partial film updates caused by changed persons or genres.
///
/// The primary cursor (`persons`) tracks linked entities, the secondary one
/// (`persons_film`) tracks the owner scan. The secondary cursor moves with
/// each batch; the primary one only when the owner scan is complete, at which
/// point the secondary cursor is dropped in the same write.
struct LinkedPartStream<'a, S> {
    source: &'a mut S,
    tracker: &'a mut WatermarkTracker,
    config: ExtractConfig,
    relation: Relation,
    phase: LinkedPhase,
    pending: Option<PendingAdvance>,
}

impl<'a, S: RowSource> LinkedPartStream<'a, S> {
    fn new(
        source: &'a mut S,
        tracker: &'a mut WatermarkTracker,
        config: ExtractConfig,
        relation: Relation,
    ) -> Self {
        Self {
            source,
            tracker,
            config,
            relation,
            phase: LinkedPhase::Start,
            pending: None,
        }
    }

    /// Every linked entity changed after the primary cursor, paged until
    /// exhausted. Returns the ids and the largest timestamp seen.
    async fn collect_linked(&mut self, after: Cursor) -> Result<(Vec<String>, Option<Cursor>)> {
        let scan = Scan::Linked(self.relation);
        let mut position = ScanPosition::start(after);
        let mut ids = Vec::new();
        let mut max = None;
        loop {
            let rows = self
                .source
                .changed_since(scan, &position, self.config.page_size)
                .await?;
            let Some(last) = rows.last() else {
                break;
            };
            position = ScanPosition::past(last);
            max = max.max(Some(last.changed_at));
            let short = rows.len() < self.config.page_size;
            ids.extend(rows.into_iter().map(|row| row.id));
            if short {
                break;
            }
        }
        Ok((ids, max))
    }

    async fn step(&mut self) -> Result<Option<RowBatch>> {
        let part = self.relation.part();
        let key = part.cursor_key();
        let owner_key = self.relation.owner_cursor_key();
        let pending = self.pending.take();

        if let LinkedPhase::Start = self.phase {
            let after = self.tracker.get_or(key, self.config.default_cursor);
            let (linked_ids, linked_max) = self.collect_linked(after).await?;
            let Some(linked_max) = linked_max else {
                info!("No {} changed after {}", self.relation.as_str(), after);
                self.phase = LinkedPhase::Done;
                return Ok(None);
            };
            let owner_after = self.tracker.get_or(owner_key, self.config.default_cursor);
            info!(
                "Extracting part '{}': {} {} changed after {}, films after {}",
                part,
                linked_ids.len(),
                self.relation.as_str(),
                after,
                owner_after
            );
            self.phase = LinkedPhase::Owners {
                linked_ids,
                linked_max,
                position: ScanPosition::start(owner_after),
                exhausted: false,
            };
        }

        let LinkedPhase::Owners {
            linked_ids,
            linked_max,
            position,
            exhausted,
        } = &mut self.phase
        else {
            return Ok(None);
        };

        let owners = if *exhausted {
            Vec::new()
        } else {
            self.source
                .changed_since(
                    Scan::Owners {
                        relation: self.relation,
                        linked_ids: linked_ids.as_slice(),
                    },
                    position,
                    self.config.page_size,
                )
                .await?
        };

        let Some(last) = owners.last() else {
            // The owner scan is complete: the pending owner cursor would be
            // cleared by this write anyway.
            let linked_max = *linked_max;
            self.tracker
                .complete_scan(key, linked_max, owner_key)
                .await?;
            debug!("Advanced cursor '{}' to {}, cleared '{}'", key, linked_max, owner_key);
            self.phase = LinkedPhase::Done;
            return Ok(None);
        };

        advance(self.tracker, owner_key, pending, owners.first()).await?;

        *position = ScanPosition::past(last);
        *exhausted = owners.len() < self.config.page_size;
        self.pending = PendingAdvance::of(&owners);

        let film_ids: Vec<String> = owners.into_iter().map(|row| row.id).collect();
        let rows = self.source.rows_by_id(self.relation, &film_ids).await?;
        debug!("Extracted {} rows of part '{}'", rows.len(), part);
        Ok(Some(RowBatch::new(part, rows)))
    }
}

#[async_trait]
impl<S: RowSource> BatchSource for LinkedPartStream<'_, S> {
    async fn next_batch(&mut self) -> Option<Result<RowBatch>> {
        if let LinkedPhase::Done = self.phase {
            return None;
        }
        let next = self.step().await.transpose();
        if !matches!(next, Some(Ok(_))) {
            self.phase = LinkedPhase::Done;
        }
        next
    }
}

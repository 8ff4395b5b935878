//! Transform stage: row batches into write actions.

use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sync_core::{Part, SchemaValidationError, SourceRow, WriteAction};

use crate::documents::{FilmDocument, GenreFilmsUpdate, PersonFilmsUpdate};
use crate::extract::BatchSource;

/// Pull side of the transform stage.
#[async_trait]
pub trait ActionSource: Send {
    /// The next action, an error, or `None` once the input is exhausted.
    async fn next_action(&mut self) -> Option<Result<WriteAction>>;
}

/// Turns every row of a part into one write action.
///
/// Pure apart from pulling batches: each row is validated against the part's
/// document shape, and a row that does not fit stops the stream with a
/// [`SchemaValidationError`].
pub struct DocumentTransformer<B> {
    part: Part,
    batches: B,
    buffered: VecDeque<SourceRow>,
    done: bool,
}

impl<B: BatchSource> DocumentTransformer<B> {
    pub fn new(part: Part, batches: B) -> Self {
        Self {
            part,
            batches,
            buffered: VecDeque::new(),
            done: false,
        }
    }
}

fn validate<T: DeserializeOwned>(part: Part, row: SourceRow) -> Result<(String, T)> {
    let document = serde_json::from_value(Value::Object(row.data)).map_err(|e| {
        SchemaValidationError {
            part,
            row_id: row.id.clone(),
            reason: e.to_string(),
        }
    })?;
    Ok((row.id, document))
}

fn to_fields<T: Serialize>(part: Part, row_id: &str, document: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(document) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(SchemaValidationError {
            part,
            row_id: row_id.to_string(),
            reason: format!("document is not an object: {other}"),
        }
        .into()),
        Err(e) => Err(SchemaValidationError {
            part,
            row_id: row_id.to_string(),
            reason: e.to_string(),
        }
        .into()),
    }
}

/// The write action for one row of `part`.
pub fn row_to_action(part: Part, row: SourceRow) -> Result<WriteAction> {
    match part {
        Part::Films => {
            let (row_id, film) = validate::<FilmDocument>(part, row)?;
            Ok(WriteAction::Index {
                id: film.id.to_string(),
                document: to_fields(part, &row_id, &film)?,
            })
        }
        Part::Persons => {
            let (row_id, update) = validate::<PersonFilmsUpdate>(part, row)?;
            Ok(WriteAction::Update {
                id: update.film_id.to_string(),
                fields: to_fields(part, &row_id, &update)?,
            })
        }
        Part::Genres => {
            let (row_id, update) = validate::<GenreFilmsUpdate>(part, row)?;
            Ok(WriteAction::Update {
                id: update.film_id.to_string(),
                fields: to_fields(part, &row_id, &update)?,
            })
        }
    }
}

#[async_trait]
impl<B: BatchSource> ActionSource for DocumentTransformer<B> {
    async fn next_action(&mut self) -> Option<Result<WriteAction>> {
        while !self.done {
            if let Some(row) = self.buffered.pop_front() {
                let action = row_to_action(self.part, row);
                if action.is_err() {
                    self.done = true;
                }
                return Some(action);
            }
            match self.batches.next_batch().await {
                Some(Ok(batch)) => self.buffered.extend(batch.rows),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => self.done = true,
            }
        }
        None
    }
}

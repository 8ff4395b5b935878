//! [`RowSource`] over a PostgreSQL session.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sync_core::{QueryError, Relation, RowSource, Scan, ScanPosition, SourceRow};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::queries::{films_name, films_query, scan_name, scan_query};
use crate::session::PostgresSession;

/// Runs the change queries of the movies catalogue.
///
/// Borrows the session, so the session's lifetime bounds every query issued
/// during a run.
pub struct PostgresRowSource<'a> {
    session: &'a PostgresSession,
}

impl<'a> PostgresRowSource<'a> {
    pub fn new(session: &'a PostgresSession) -> Self {
        Self { session }
    }
}

fn parse_id(query: &str, id: &str) -> Result<Uuid> {
    Uuid::parse_str(id)
        .map_err(|e| QueryError::new(query, format!("invalid id '{id}': {e}")).into())
}

fn parse_ids(query: &str, ids: &[String]) -> Result<Vec<Uuid>> {
    ids.iter().map(|id| parse_id(query, id)).collect()
}

fn to_source_row(query: &str, row: &Row) -> Result<SourceRow> {
    let id: String = row
        .try_get("id")
        .map_err(|e| QueryError::new(query, e))?;
    let updated_at: DateTime<Utc> = row
        .try_get("updated_at")
        .map_err(|e| QueryError::new(query, e))?;

    let has_data = row.columns().iter().any(|c| c.name() == "data");
    let data = if has_data {
        match row
            .try_get::<_, Value>("data")
            .map_err(|e| QueryError::new(query, e))?
        {
            Value::Object(map) => map,
            other => {
                return Err(
                    QueryError::new(query, format!("row data is not an object: {other}")).into(),
                )
            }
        }
    } else {
        Map::new()
    };

    Ok(SourceRow::new(id, updated_at.into(), data))
}

#[async_trait]
impl RowSource for PostgresRowSource<'_> {
    async fn changed_since(
        &mut self,
        scan: Scan<'_>,
        position: &ScanPosition,
        limit: usize,
    ) -> Result<Vec<SourceRow>> {
        let name = scan_name(&scan);
        let after = position.after.timestamp();
        let after_id = position
            .after_id
            .as_deref()
            .map(|id| parse_id(name, id))
            .transpose()?;
        let limit = i64::try_from(limit).map_err(|e| QueryError::new(name, e))?;

        let linked_ids = match scan {
            Scan::Owners { linked_ids, .. } => Some(parse_ids(name, linked_ids)?),
            _ => None,
        };
        let params: Vec<&(dyn ToSql + Sync)> = match &linked_ids {
            Some(ids) => vec![&after, &after_id, ids, &limit],
            None => vec![&after, &after_id, &limit],
        };

        tracing::trace!("Executing PostgreSQL query '{}' after {:?}", name, position);
        let rows = self
            .session
            .client()
            .query(scan_query(&scan), &params)
            .await
            .map_err(|e| QueryError::new(name, e))?;

        rows.iter().map(|row| to_source_row(name, row)).collect()
    }

    async fn rows_by_id(&mut self, relation: Relation, ids: &[String]) -> Result<Vec<SourceRow>> {
        let name = films_name(relation);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = parse_ids(name, ids)?;

        tracing::trace!("Executing PostgreSQL query '{}' for {} ids", name, ids.len());
        let rows = self
            .session
            .client()
            .query(films_query(relation), &[&ids])
            .await
            .map_err(|e| QueryError::new(name, e))?;

        rows.iter().map(|row| to_source_row(name, row)).collect()
    }
}

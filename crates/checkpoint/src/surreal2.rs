//! SurrealDB v2 SDK checkpoint storage implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::sql::{Id, Thing};
use sync_core::PersistenceError;

use crate::store::{CheckpointStore, Snapshot};

/// Snapshot record as stored in SurrealDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSnapshot {
    cursors: Snapshot,
    updated_at: DateTime<Utc>,
}

/// SurrealDB v2 SDK implementation of CheckpointStore trait.
///
/// Keeps the whole snapshot in a single record `<table>:<name>`, so several
/// sync deployments can share one checkpoint table under different names.
pub struct Surreal2Store {
    client: surrealdb::Surreal<Any>,
    table_name: String,
    record_name: String,
}

impl Surreal2Store {
    /// Create a new Surreal2Store with the given client, table and record name.
    pub fn new(client: surrealdb::Surreal<Any>, table_name: String, record_name: String) -> Self {
        Self {
            client,
            table_name,
            record_name,
        }
    }

    fn to_thing(&self) -> Thing {
        Thing::from((
            self.table_name.as_str(),
            Id::String(self.record_name.clone()),
        ))
    }
}

fn unavailable(e: surrealdb::Error) -> anyhow::Error {
    PersistenceError::Unavailable(e.to_string()).into()
}

#[async_trait]
impl CheckpointStore for Surreal2Store {
    async fn load(&self) -> Result<Snapshot> {
        let mut response = self
            .client
            .query("SELECT * FROM $record_id")
            .bind(("record_id", self.to_thing()))
            .await
            .map_err(unavailable)?;
        let stored: Vec<StoredSnapshot> = response.take(0).map_err(unavailable)?;
        Ok(stored
            .into_iter()
            .next()
            .map(|s| s.cursors)
            .unwrap_or_default())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let stored = StoredSnapshot {
            cursors: snapshot.clone(),
            updated_at: Utc::now(),
        };
        self.client
            .query("UPSERT $record_id CONTENT $content")
            .bind(("record_id", self.to_thing()))
            .bind(("content", stored))
            .await
            .map_err(unavailable)?
            .check()
            .map_err(unavailable)?;
        Ok(())
    }
}

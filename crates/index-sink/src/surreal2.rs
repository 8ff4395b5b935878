//! SurrealDB v2 SDK implementation of [`IndexSink`].

use std::collections::HashMap;

use anyhow::Result;
use serde_json::{Map, Value};
use surrealdb::engine::any::Any;
use surrealdb::sql::{Id, Thing};
use surrealdb::Surreal;
use sync_core::WriteAction;

use crate::traits::{ActionOutcome, IndexSchema, IndexSink};

/// Writes documents as records of a SurrealDB table.
///
/// `Index` actions become `UPSERT .. CONTENT`, `Update` actions become
/// `UPDATE .. MERGE`, which leaves a missing record untouched. A whole bulk
/// call is one multi-statement query without a transaction, so one rejected
/// record does not roll back the others.
pub struct SurrealIndexSink {
    client: Surreal<Any>,
}

impl SurrealIndexSink {
    pub fn new(client: Surreal<Any>) -> Self {
        Self { client }
    }

    /// Connect to SurrealDB v2 and select the namespace and database.
    pub async fn connect(
        endpoint: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self> {
        // Convert http:// to ws:// for WebSocket connection
        let ws_endpoint = endpoint
            .replace("http://", "ws://")
            .replace("https://", "wss://");

        tracing::debug!(
            "Connecting to SurrealDB at {} (namespace: {}, database: {})",
            ws_endpoint,
            namespace,
            database
        );

        let client = surrealdb::engine::any::connect(&ws_endpoint)
            .await
            .map_err(|e| anyhow::anyhow!("SurrealDB connection to '{ws_endpoint}' failed: {e}"))?;

        client
            .signin(surrealdb::opt::auth::Root { username, password })
            .await
            .map_err(|e| {
                anyhow::anyhow!("SurrealDB authentication failed (user: '{username}'): {e}")
            })?;

        client.use_ns(namespace).use_db(database).await.map_err(|e| {
            anyhow::anyhow!(
                "SurrealDB failed to select namespace '{namespace}' / database '{database}': {e}"
            )
        })?;

        Ok(Self { client })
    }

    pub fn inner(&self) -> &Surreal<Any> {
        &self.client
    }
}

/// Record content without the `id` key; the record id is bound separately
/// and SurrealDB rejects a content `id` that disagrees with it.
fn record_body(action: &WriteAction) -> Map<String, Value> {
    let mut body = action.body().clone();
    body.remove("id");
    body
}

fn bulk_query(actions: &[WriteAction]) -> String {
    let mut query = String::new();
    for (i, action) in actions.iter().enumerate() {
        let statement = match action {
            WriteAction::Index { .. } => format!("UPSERT $rid{i} CONTENT $body{i} RETURN id;\n"),
            WriteAction::Update { .. } => format!("UPDATE $rid{i} MERGE $body{i} RETURN id;\n"),
        };
        query.push_str(&statement);
    }
    query
}

#[async_trait::async_trait]
impl IndexSink for SurrealIndexSink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let mut result = self.client.query("INFO FOR DB;").await?;

        let info: Option<Value> = result.take(0)?;

        if let Some(info) = info {
            if let Some(tables) = info.get("tables").and_then(Value::as_object) {
                return Ok(tables.contains_key(index));
            }
        }

        Ok(false)
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()> {
        tracing::info!("Creating SurrealDB table '{}'", index);
        self.client
            .query(schema.definition())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create table '{index}': {e}"))?
            .check()
            .map_err(|e| anyhow::anyhow!("Failed to create table '{index}': {e}"))?;
        Ok(())
    }

    async fn bulk(&self, index: &str, actions: &[WriteAction]) -> Result<Vec<ActionOutcome>> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }

        let mut q = self.client.query(bulk_query(actions));
        for (i, action) in actions.iter().enumerate() {
            let thing = Thing::from((index, Id::String(action.id().to_string())));
            q = q.bind((format!("rid{i}"), thing));
            q = q.bind((format!("body{i}"), record_body(action)));
        }

        let mut response = q.await.map_err(|e| {
            tracing::error!(
                "SurrealDB bulk query on '{}' with {} statements failed: {}",
                index,
                actions.len(),
                e
            );
            e
        })?;

        let mut errors: HashMap<usize, surrealdb::Error> = response.take_errors();
        let mut outcomes = Vec::with_capacity(actions.len());
        for (i, action) in actions.iter().enumerate() {
            if let Some(e) = errors.remove(&i) {
                outcomes.push(ActionOutcome::Failed {
                    reason: format!("{}: {e}", action.id()),
                });
                continue;
            }
            let written: Vec<Thing> = response.take((i, "id"))?;
            if !written.is_empty() {
                tracing::trace!("Successfully wrote record {}:{}", index, action.id());
                outcomes.push(ActionOutcome::Written);
            } else if action.is_partial() {
                outcomes.push(ActionOutcome::Skipped {
                    reason: format!("document '{}' is not indexed yet", action.id()),
                });
            } else {
                outcomes.push(ActionOutcome::Failed {
                    reason: format!("{}: UPSERT returned no record", action.id()),
                });
            }
        }
        Ok(outcomes)
    }
}

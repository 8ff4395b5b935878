//! In-memory [`IndexSink`] used by tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use serde_json::{Map, Value};
use sync_core::WriteAction;

use crate::traits::{ActionOutcome, IndexSchema, IndexSink};

type Index = BTreeMap<String, Map<String, Value>>;

#[derive(Debug, Default)]
struct MemoryState {
    indexes: HashMap<String, Index>,
    bulk_sizes: Vec<usize>,
    create_calls: usize,
    failing_bulks: usize,
}

/// Sink keeping every index as a map of document id to document.
///
/// Clones share state, so a test can hand one clone to the pipeline and keep
/// another to inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` bulk calls fail as a whole, as an unreachable
    /// server would.
    pub fn fail_next_bulks(&self, n: usize) {
        self.lock().failing_bulks = n;
    }

    /// Documents of `index`, ordered by id.
    pub fn documents(&self, index: &str) -> Index {
        self.lock().indexes.get(index).cloned().unwrap_or_default()
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        self.lock().indexes.get(index)?.get(id).cloned()
    }

    /// Number of actions of every successful bulk call, in call order.
    pub fn bulk_sizes(&self) -> Vec<usize> {
        self.lock().bulk_sizes.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }
}

#[async_trait::async_trait]
impl IndexSink for MemorySink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.lock().indexes.contains_key(index))
    }

    async fn create_index(&self, index: &str, _schema: &IndexSchema) -> Result<()> {
        let mut state = self.lock();
        state.create_calls += 1;
        state.indexes.entry(index.to_string()).or_default();
        Ok(())
    }

    async fn bulk(&self, index: &str, actions: &[WriteAction]) -> Result<Vec<ActionOutcome>> {
        let mut state = self.lock();
        if state.failing_bulks > 0 {
            state.failing_bulks -= 1;
            anyhow::bail!("connection refused");
        }
        state.bulk_sizes.push(actions.len());

        let Some(documents) = state.indexes.get_mut(index) else {
            return Ok(actions
                .iter()
                .map(|_| ActionOutcome::Failed {
                    reason: format!("index '{index}' does not exist"),
                })
                .collect());
        };

        let outcomes = actions
            .iter()
            .map(|action| match action {
                WriteAction::Index { id, document } => {
                    documents.insert(id.clone(), document.clone());
                    ActionOutcome::Written
                }
                WriteAction::Update { id, fields } => match documents.get_mut(id) {
                    Some(existing) => {
                        for (key, value) in fields {
                            existing.insert(key.clone(), value.clone());
                        }
                        ActionOutcome::Written
                    }
                    None => ActionOutcome::Skipped {
                        reason: format!("document '{id}' is not indexed yet"),
                    },
                },
            })
            .collect();
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_bulk_into_missing_index_fails_per_action() {
        let sink = MemorySink::new();
        let outcomes = sink
            .bulk(
                "movies",
                &[WriteAction::Index {
                    id: "a".to_string(),
                    document: Map::new(),
                }],
            )
            .await
            .unwrap();
        assert!(outcomes[0].is_failure());
    }

    #[tokio::test]
    async fn test_update_merges_or_skips() {
        let sink = MemorySink::new();
        sink.create_index("movies", &IndexSchema::new(""))
            .await
            .unwrap();
        let outcomes = sink
            .bulk(
                "movies",
                &[
                    WriteAction::Index {
                        id: "a".to_string(),
                        document: doc(json!({"title": "A", "genre": []})),
                    },
                    WriteAction::Update {
                        id: "a".to_string(),
                        fields: doc(json!({"genre": ["Drama"]})),
                    },
                    WriteAction::Update {
                        id: "b".to_string(),
                        fields: doc(json!({"genre": ["Drama"]})),
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(outcomes[0], ActionOutcome::Written);
        assert_eq!(outcomes[1], ActionOutcome::Written);
        assert!(matches!(outcomes[2], ActionOutcome::Skipped { .. }));
        assert_eq!(
            Value::Object(sink.document("movies", "a").unwrap()),
            json!({"title": "A", "genre": ["Drama"]})
        );
        assert!(sink.document("movies", "b").is_none());
    }

    #[tokio::test]
    async fn test_fail_next_bulks() {
        let sink = MemorySink::new();
        sink.create_index("movies", &IndexSchema::new(""))
            .await
            .unwrap();
        sink.fail_next_bulks(1);
        assert!(sink.bulk("movies", &[]).await.is_err());
        assert!(sink.bulk("movies", &[]).await.is_ok());
        assert_eq!(sink.bulk_sizes(), vec![0]);
    }
}

//! IndexSink trait definition.
//!
//! This trait abstracts over the document store the pipeline writes into,
//! so the load stage can be compiled against a single interface that works
//! with SurrealDB as well as the in-memory sink used by tests.

use anyhow::Result;
use sync_core::WriteAction;

/// Result of one write action inside a bulk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The document was written.
    Written,
    /// Nothing to do, e.g. a partial update of a document that is not
    /// indexed yet. Not a failure.
    Skipped { reason: String },
    /// The sink rejected the action.
    Failed { reason: String },
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ActionOutcome::Failed { .. })
    }
}

/// Definition used to create a storage object (table plus search indexes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    definition: String,
}

impl IndexSchema {
    /// A schema from raw SurrealQL statements.
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
        }
    }

    /// Read a schema definition file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let definition = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read index schema {}: {e}", path.display())
        })?;
        Ok(Self::new(definition))
    }

    /// Built-in schema of the movies index: a schemaless table with
    /// full-text search on the fields the search API queries.
    pub fn builtin(index: &str) -> Self {
        let analyzer = format!("{index}_search");
        let mut definition = format!(
            "DEFINE TABLE IF NOT EXISTS {index} SCHEMALESS;\n\
             DEFINE ANALYZER IF NOT EXISTS {analyzer} TOKENIZERS blank, class FILTERS lowercase, snowball(english);\n"
        );
        for field in ["title", "description", "actors_names", "writers_names"] {
            definition.push_str(&format!(
                "DEFINE INDEX IF NOT EXISTS {index}_{field} ON {index} FIELDS {field} SEARCH ANALYZER {analyzer} BM25;\n"
            ));
        }
        definition.push_str(&format!(
            "DEFINE INDEX IF NOT EXISTS {index}_imdb_rating ON {index} FIELDS imdb_rating;\n"
        ));
        Self::new(definition)
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }
}

/// Trait for writing documents into the index store.
///
/// # Usage Pattern
///
/// The load stage uses generics for zero-cost dispatch:
///
/// ```ignore
/// pub struct SinkWriter<S: IndexSink> { sink: S, .. }
///
/// if !sink.index_exists("movies").await? {
///     sink.create_index("movies", &schema).await?;
/// }
/// let outcomes = sink.bulk("movies", chunk.actions()).await?;
/// ```
#[async_trait::async_trait]
pub trait IndexSink: Send + Sync {
    /// Whether the storage object `index` exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create the storage object `index` from `schema`.
    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()>;

    /// Apply `actions` to `index` as one bulk operation.
    ///
    /// Returns one outcome per action, in order. An `Err` means the call as a
    /// whole failed (transport, authentication); per-action rejections are
    /// reported as [`ActionOutcome::Failed`].
    async fn bulk(&self, index: &str, actions: &[WriteAction]) -> Result<Vec<ActionOutcome>>;
}

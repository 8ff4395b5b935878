//! Sink-directed write actions.

use serde::Serialize;
use serde_json::{Map, Value};

/// One write against a document of the index, addressed by document id.
///
/// Both variants are idempotent at the sink: `Index` replaces the whole
/// document, `Update` merges the named fields into an existing document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteAction {
    /// Insert or replace the whole document.
    Index {
        id: String,
        document: Map<String, Value>,
    },
    /// Merge `fields` into the document.
    Update {
        id: String,
        fields: Map<String, Value>,
    },
}

impl WriteAction {
    pub fn id(&self) -> &str {
        match self {
            WriteAction::Index { id, .. } | WriteAction::Update { id, .. } => id,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, WriteAction::Update { .. })
    }

    pub fn body(&self) -> &Map<String, Value> {
        match self {
            WriteAction::Index { document, .. } => document,
            WriteAction::Update { fields, .. } => fields,
        }
    }
}

/// A group of write actions sent to the sink as one bulk call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionChunk {
    actions: Vec<WriteAction>,
}

impl ActionChunk {
    pub fn new(actions: Vec<WriteAction>) -> Self {
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[WriteAction] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<WriteAction> {
        self.actions
    }
}

impl From<Vec<WriteAction>> for ActionChunk {
    fn from(actions: Vec<WriteAction>) -> Self {
        Self::new(actions)
    }
}

impl IntoIterator for ActionChunk {
    type Item = WriteAction;
    type IntoIter = std::vec::IntoIter<WriteAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

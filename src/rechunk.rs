//! Re-batching of write actions into sink-sized chunks.

use anyhow::Result;
use sync_core::{ActionChunk, WriteAction};

use crate::transform::ActionSource;

/// Buffers actions and emits them `chunk_size` at a time.
///
/// Full chunks come first, then the non-empty remainder, then `None`. Order
/// is preserved and every chunk is non-empty. The extract page size and the
/// chunk size are independent, so a single bulk call may carry actions from
/// several pages.
pub struct Rechunker<A> {
    actions: A,
    chunk_size: usize,
    done: bool,
}

impl<A: ActionSource> Rechunker<A> {
    /// `chunk_size` must be at least 1; the CLI rejects anything smaller.
    pub fn new(actions: A, chunk_size: usize) -> Self {
        Self {
            actions,
            chunk_size: chunk_size.max(1),
            done: false,
        }
    }

    pub async fn next_chunk(&mut self) -> Option<Result<ActionChunk>> {
        if self.done {
            return None;
        }

        let mut buffer: Vec<WriteAction> = Vec::with_capacity(self.chunk_size);
        while buffer.len() < self.chunk_size {
            match self.actions.next_action().await {
                Some(Ok(action)) => buffer.push(action),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if buffer.is_empty() {
            None
        } else {
            Some(Ok(ActionChunk::new(buffer)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::collections::VecDeque;

    struct VecActions(VecDeque<Result<WriteAction>>);

    #[async_trait]
    impl ActionSource for VecActions {
        async fn next_action(&mut self) -> Option<Result<WriteAction>> {
            self.0.pop_front()
        }
    }

    fn actions(n: usize) -> VecActions {
        VecActions(
            (0..n)
                .map(|i| {
                    Ok(WriteAction::Index {
                        id: format!("doc-{i}"),
                        document: Map::new(),
                    })
                })
                .collect(),
        )
    }

    async fn chunk_sizes(n: usize, size: usize) -> Vec<usize> {
        let mut rechunker = Rechunker::new(actions(n), size);
        let mut sizes = Vec::new();
        while let Some(chunk) = rechunker.next_chunk().await {
            sizes.push(chunk.unwrap().len());
        }
        sizes
    }

    #[tokio::test]
    async fn test_chunk_count_is_ceiling() {
        assert_eq!(chunk_sizes(10, 3).await, vec![3, 3, 3, 1]);
        assert_eq!(chunk_sizes(9, 3).await, vec![3, 3, 3]);
        assert_eq!(chunk_sizes(2, 100).await, vec![2]);
        assert!(chunk_sizes(0, 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let mut rechunker = Rechunker::new(actions(5), 2);
        let mut ids = Vec::new();
        while let Some(chunk) = rechunker.next_chunk().await {
            ids.extend(chunk.unwrap().into_iter().map(|a| a.id().to_string()));
        }
        let expected: Vec<String> = (0..5).map(|i| format!("doc-{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let mut source = actions(1);
        source.0.push_back(Err(anyhow::anyhow!("bad row")));
        source.0.push_back(Ok(WriteAction::Index {
            id: "late".to_string(),
            document: Map::new(),
        }));
        let mut rechunker = Rechunker::new(source, 10);

        assert!(rechunker.next_chunk().await.unwrap().is_err());
        assert!(rechunker.next_chunk().await.is_none());
    }
}

//! Top-k retrieval over a [`VectorIndex`].
//!
//! The retriever is a thin read-through: it holds no cache, because the
//! corpus can change between calls via ingestion.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::RetrievalResult;

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 4;

pub struct Retriever {
    index: Arc<VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve the configured number of chunks nearest `query_vector`.
    pub fn retrieve(&self, query_vector: &[f32]) -> Result<RetrievalResult> {
        self.retrieve_k(query_vector, self.top_k)
    }

    /// Retrieve up to `k` chunks nearest `query_vector`.
    ///
    /// An empty index yields an empty result, not an error.
    pub fn retrieve_k(&self, query_vector: &[f32], k: usize) -> Result<RetrievalResult> {
        let result = self.index.query(query_vector, k)?;
        debug!(k, hits = result.len(), "retrieved");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::MemoryStore;
    use crate::models::{Chunk, IndexEntry};

    fn entry(text: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry::new(
            Chunk {
                id: text.to_string(),
                source: "doc.txt".into(),
                chunk_index: 0,
                text: text.to_string(),
                overlap: 0,
                hash: String::new(),
            },
            embedding,
        )
    }

    #[tokio::test]
    async fn test_default_k() {
        let index = Arc::new(VectorIndex::new(Arc::new(MemoryStore::new())));
        let entries = (0..6)
            .map(|i| entry(&format!("c{i}"), vec![1.0, i as f32]))
            .collect();
        index.insert(entries).await.unwrap();

        let retriever = Retriever::new(index, DEFAULT_TOP_K);
        assert_eq!(retriever.retrieve(&[1.0, 0.0]).unwrap().len(), 4);
        assert_eq!(retriever.retrieve_k(&[1.0, 0.0], 2).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sees_later_inserts() {
        let index = Arc::new(VectorIndex::new(Arc::new(MemoryStore::new())));
        let retriever = Retriever::new(index.clone(), DEFAULT_TOP_K);
        assert!(retriever.retrieve(&[1.0, 0.0]).unwrap().is_empty());

        index
            .insert(vec![entry("fresh", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(retriever.retrieve(&[1.0, 0.0]).unwrap().texts(), vec!["fresh"]);
    }
}

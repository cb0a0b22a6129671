//! Core data models used throughout docqa.
//!
//! These types represent the documents, chunks, index entries, and answers
//! that flow through the ingestion and query pipelines.

use serde::Serialize;

/// Raw document text plus the identifier of where it came from.
///
/// `source` is the corpus-relative file path (e.g. `"policies/refunds.txt"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// A contiguous slice of a [`Document`].
///
/// The first `overlap` characters of `text` repeat the tail of the previous
/// chunk of the same document; the remainder is new text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub overlap: usize,
    pub hash: String,
}

impl Chunk {
    /// The part of `text` not shared with the preceding chunk.
    pub fn novel_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None if self.overlap == 0 => &self.text,
            None => "",
        }
    }
}

/// One durable unit of the vector index.
///
/// `seq` is assigned by the index at insert time and orders entries by
/// insertion; `inserted_at` is a Unix timestamp in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub seq: u64,
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
    pub inserted_at: i64,
}

impl IndexEntry {
    /// Pair a chunk with its embedding. `seq` and `inserted_at` are filled
    /// in by the index when the entry is committed.
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            seq: 0,
            embedding,
            chunk,
            inserted_at: 0,
        }
    }

    pub fn dims(&self) -> usize {
        self.embedding.len()
    }
}

/// A chunk paired with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked retrieval output, descending by score.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.hits.iter()
    }

    /// Chunk texts in rank order.
    pub fn texts(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.chunk.text.as_str()).collect()
    }
}

/// The response to one question. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub bot: String,
    pub query: String,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, overlap: usize) -> Chunk {
        Chunk {
            id: "c".into(),
            source: "s".into(),
            chunk_index: 0,
            text: text.into(),
            overlap,
            hash: String::new(),
        }
    }

    #[test]
    fn test_novel_text_skips_overlap_chars() {
        assert_eq!(chunk("hello world", 0).novel_text(), "hello world");
        assert_eq!(chunk("hello world", 6).novel_text(), "world");
        assert_eq!(chunk("héllo", 2).novel_text(), "llo");
        assert_eq!(chunk("abc", 3).novel_text(), "");
    }
}

//! Recursive-separator text chunker with overlap.
//!
//! Splits a [`Document`] into [`Chunk`]s of at most `chunk_size` characters,
//! each sharing up to `chunk_overlap` characters with its predecessor.
//!
//! # Algorithm
//!
//! 1. Recursively split the text on the highest-priority separator it
//!    contains (paragraph, line, sentence, word) until every piece fits in
//!    `chunk_size - chunk_overlap` characters. Separators stay attached to
//!    the piece they end, so the pieces concatenate back to the input.
//! 2. Greedily pack consecutive pieces into a chunk while it stays within
//!    budget.
//! 3. Start the next chunk with the trailing `chunk_overlap` characters of
//!    the previous one, moved forward to a word start when the window
//!    begins mid-word.
//!
//! A piece with no separator at all is kept whole even when it exceeds the
//! budget; chunking never drops text.
//!
//! Every chunk is an exact substring of the document, so dropping each
//! chunk's `overlap` prefix and concatenating the rest reproduces the input.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{chunk_document, ChunkingParams};
//! use docqa_core::models::Document;
//!
//! let doc = Document::new("refunds.txt", "Refund requests must be filed within 30 days.");
//! let params = ChunkingParams::new(500, 20).unwrap();
//! let chunks = chunk_document(&doc, &params);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, doc.text);
//! ```

use std::ops::Range;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document};

/// Separators in priority order: paragraph, line, sentence, word.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// Chunk size and overlap, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingParams {
    /// Validate `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Validation("chunk_size must be > 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

/// Split a document into overlapping chunks.
///
/// Returns chunks with contiguous indices starting at 0. An empty document
/// yields no chunks; a document of at most `chunk_size` characters yields
/// exactly one.
pub fn chunk_document(doc: &Document, params: &ChunkingParams) -> Vec<Chunk> {
    let text = doc.text.as_str();
    if text.is_empty() {
        return Vec::new();
    }

    let target = params.chunk_size - params.chunk_overlap;
    let mut pieces = Vec::new();
    split_recursive(text, 0, target, SEPARATORS, &mut pieces);

    let mut chunks = Vec::new();
    // Byte offset where the current chunk's text (overlap included) begins.
    let mut chunk_start = 0;
    let mut overlap_chars = 0;
    let mut core_end = 0;
    let mut core_chars = 0;
    let mut budget = params.chunk_size;

    for piece in pieces {
        let piece_chars = char_len(&text[piece.clone()]);

        if core_chars > 0 && core_chars + piece_chars > budget {
            chunks.push(make_chunk(
                &doc.source,
                chunks.len() as i64,
                &text[chunk_start..core_end],
                overlap_chars,
            ));
            let (start, chars) =
                overlap_window(text, chunk_start, core_end, params.chunk_overlap);
            chunk_start = start;
            overlap_chars = chars;
            core_chars = 0;
            budget = params.chunk_size - overlap_chars;
        }

        core_end = piece.end;
        core_chars += piece_chars;
    }

    if core_chars > 0 {
        chunks.push(make_chunk(
            &doc.source,
            chunks.len() as i64,
            &text[chunk_start..core_end],
            overlap_chars,
        ));
    }

    chunks
}

/// Rebuild the original text from a document's chunks, in order.
pub fn reassemble(chunks: &[Chunk]) -> String {
    chunks.iter().map(Chunk::novel_text).collect()
}

/// Split `text` into byte ranges (offset by `offset`) of at most `target`
/// characters where a separator allows it.
fn split_recursive(
    text: &str,
    offset: usize,
    target: usize,
    separators: &[&str],
    out: &mut Vec<Range<usize>>,
) {
    if char_len(text) <= target {
        out.push(offset..offset + text.len());
        return;
    }

    let Some(pos) = separators.iter().position(|sep| text.contains(sep)) else {
        // Unsplittable: emitted whole.
        out.push(offset..offset + text.len());
        return;
    };

    let finer = &separators[pos + 1..];
    let mut start = 0;
    for segment in split_keeping_separator(text, separators[pos]) {
        split_recursive(segment, offset + start, target, finer, out);
        start += segment.len();
    }
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Locate the overlap carried from the chunk `text[chunk_start..chunk_end]`
/// into the next one. Returns the byte offset where the next chunk starts
/// and the overlap length in characters.
fn overlap_window(
    text: &str,
    chunk_start: usize,
    chunk_end: usize,
    max_chars: usize,
) -> (usize, usize) {
    if max_chars == 0 {
        return (chunk_end, 0);
    }

    let chunk = &text[chunk_start..chunk_end];
    let total = char_len(chunk);
    let take = max_chars.min(total);
    let mut start = chunk
        .char_indices()
        .nth(total - take)
        .map(|(i, _)| i)
        .unwrap_or(chunk.len());

    let mid_word = start > 0
        && !chunk[..start].ends_with(char::is_whitespace)
        && !chunk[start..].starts_with(char::is_whitespace);
    if mid_word {
        if let Some(ws) = chunk[start..].find(char::is_whitespace) {
            let rest = chunk[start + ws..].trim_start();
            start = chunk.len() - rest.len();
        }
    }

    (chunk_start + start, char_len(&chunk[start..]))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Create a [`Chunk`] with a content-derived id and SHA-256 hash.
fn make_chunk(source: &str, index: i64, text: &str, overlap: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let name = format!("{}\u{0}{}\u{0}{}", source, index, hash);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();

    Chunk {
        id,
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        overlap,
        hash,
    }
}

//! Embedding service trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helper functions for vector serialization and similarity
//! computation.
//!
//! Concrete backends (OpenAI, Ollama, fastembed) live in the `docqa` app
//! crate.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for embedding services.
///
/// An embedder maps a batch of texts to vectors of a fixed dimension,
/// returning exactly one vector per input in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Serialize an embedding into the `embedding` BLOB layout: each component
/// as 4 little-endian bytes, in order.
///
/// ```rust
/// use docqa_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let blob = vec_to_blob(&[0.5, -1.0]);
/// assert_eq!(blob.len(), 8);
/// assert_eq!(blob_to_vec(&blob), Some(vec![0.5, -1.0]));
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Parse a BLOB written by [`vec_to_blob`].
///
/// Returns `None` when the length is not a whole number of components.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    let words = blob.chunks_exact(4);
    if !words.remainder().is_empty() {
        return None;
    }
    Some(
        words
            .map(|w| f32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect(),
    )
}

/// Whether every component is a finite number.
pub fn is_finite(vec: &[f32]) -> bool {
    vec.iter().all(|v| v.is_finite())
}

/// Cosine similarity of two embeddings, in `[-1.0, 1.0]`.
///
/// Vectors of unequal length, zero vectors, and vectors with non-finite
/// components score `0.0`, so every score is comparable.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = (norm_a * norm_b).sqrt();
    let score = dot / denom;
    if denom < f32::EPSILON || !score.is_finite() {
        return 0.0;
    }
    score.clamp(-1.0, 1.0)
}

//! Vector index with pluggable persistence.
//!
//! [`VectorIndex`] holds every [`IndexEntry`] in memory and answers
//! k-nearest-neighbour queries by brute-force cosine similarity. Writes go
//! through to an [`IndexStore`] before they become visible to readers.
//!
//! # Concurrency
//!
//! Readers clone an `Arc` to the current snapshot and score it without
//! holding any lock, so a query never waits on store I/O. Writers serialize
//! on an async mutex, commit to the store, then swap in a new snapshot. A
//! reader sees either the state before a write or the state after it.
//!
//! # Failure
//!
//! A store error of kind [`RagError::IndexUnavailable`] latches the index:
//! every later operation fails with the same kind until the process
//! restarts.

pub mod memory;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, error};

use crate::embedding::{cosine_similarity, is_finite};
use crate::error::{RagError, Result};
use crate::models::{IndexEntry, RetrievalResult, ScoredChunk};

/// Durable storage behind a [`VectorIndex`].
///
/// Every mutating call must be atomic: either all of it is stored or none.
/// Implementations report unreachable storage as
/// [`RagError::IndexUnavailable`].
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`exists`](IndexStore::exists) | Whether a completed build was persisted |
/// | [`load`](IndexStore::load) | All entries, ordered by `seq` |
/// | [`append`](IndexStore::append) | Add entries |
/// | [`replace_source`](IndexStore::replace_source) | Swap one source's entries |
/// | [`clear`](IndexStore::clear) | Remove everything, including the built marker |
/// | [`flush`](IndexStore::flush) | Make writes durable and mark the index built |
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn exists(&self) -> Result<bool>;
    async fn load(&self) -> Result<Vec<IndexEntry>>;
    async fn append(&self, entries: &[IndexEntry]) -> Result<()>;
    async fn replace_source(&self, source: &str, entries: &[IndexEntry]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    async fn flush(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct Snapshot {
    entries: Vec<IndexEntry>,
    dimension: Option<usize>,
}

impl Snapshot {
    fn from_entries(entries: Vec<IndexEntry>) -> Self {
        let dimension = entries.first().map(IndexEntry::dims);
        Self { entries, dimension }
    }

    fn next_seq(&self) -> u64 {
        self.entries.last().map(|e| e.seq + 1).unwrap_or(1)
    }
}

/// In-memory nearest-neighbour index backed by an [`IndexStore`].
pub struct VectorIndex {
    store: Arc<dyn IndexStore>,
    snapshot: RwLock<Arc<Snapshot>>,
    writer: tokio::sync::Mutex<()>,
    unavailable: AtomicBool,
}

impl VectorIndex {
    /// Create an empty index over `store`. Nothing is read from the store
    /// until [`load`](Self::load).
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            writer: tokio::sync::Mutex::new(()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Whether the store holds a completed build.
    pub async fn exists(&self) -> Result<bool> {
        self.check_available()?;
        let exists = self.store.exists().await;
        self.observe(exists)
    }

    /// Replace the in-memory state with the store's contents.
    ///
    /// Returns the number of entries loaded.
    pub async fn load(&self) -> Result<usize> {
        self.check_available()?;
        let _guard = self.writer.lock().await;

        let mut entries = self.observe(self.store.load().await)?;
        entries.sort_by_key(|e| e.seq);
        if let Some(first) = entries.first() {
            let dims = first.dims();
            if let Some(bad) = entries.iter().find(|e| e.dims() != dims) {
                let err = RagError::IndexUnavailable(format!(
                    "persisted entry {} has dimension {}, expected {}",
                    bad.seq,
                    bad.dims(),
                    dims
                ));
                return self.observe(Err(err));
            }
        }

        let count = entries.len();
        self.publish(Snapshot::from_entries(entries));
        debug!(entries = count, "index loaded");
        Ok(count)
    }

    /// Append entries, assigning sequence numbers and timestamps.
    ///
    /// All entries become visible together, or none do. Returns the number
    /// inserted.
    pub async fn insert(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        self.check_available()?;
        if entries.is_empty() {
            return Ok(0);
        }
        let _guard = self.writer.lock().await;

        let current = self.current();
        validate_dimensions(current.dimension, &entries)?;
        let entries = stamp(entries, current.next_seq());

        self.observe(self.store.append(&entries).await)?;

        let mut next = current.entries.clone();
        next.extend(entries);
        let count = next.len() - current.entries.len();
        self.publish(Snapshot::from_entries(next));
        Ok(count)
    }

    /// Atomically drop every entry of `source` and append `entries`.
    ///
    /// Returns the number inserted.
    pub async fn replace_source(&self, source: &str, entries: Vec<IndexEntry>) -> Result<usize> {
        self.check_available()?;
        let _guard = self.writer.lock().await;

        let current = self.current();
        let kept: Vec<IndexEntry> = current
            .entries
            .iter()
            .filter(|e| e.chunk.source != source)
            .cloned()
            .collect();
        let established = kept.first().map(IndexEntry::dims);
        validate_dimensions(established, &entries)?;
        let entries = stamp(entries, current.next_seq());

        self.observe(self.store.replace_source(source, &entries).await)?;

        let count = entries.len();
        let removed = current.entries.len() - kept.len();
        let mut next = kept;
        next.extend(entries);
        self.publish(Snapshot::from_entries(next));
        debug!(source, removed, inserted = count, "source replaced");
        Ok(count)
    }

    /// Remove every entry and the built marker.
    pub async fn clear(&self) -> Result<()> {
        self.check_available()?;
        let _guard = self.writer.lock().await;
        self.observe(self.store.clear().await)?;
        self.publish(Snapshot::default());
        Ok(())
    }

    /// Flush the store and mark the index as built.
    pub async fn persist(&self) -> Result<()> {
        self.check_available()?;
        let _guard = self.writer.lock().await;
        self.observe(self.store.flush().await)
    }

    /// Top-`k` entries by cosine similarity to `vector`, descending.
    ///
    /// Ties keep insertion order. An empty index or `k == 0` yields an
    /// empty result.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        self.check_available()?;
        let snapshot = self.current();

        let Some(dimension) = snapshot.dimension else {
            return Ok(RetrievalResult::empty());
        };
        if k == 0 {
            return Ok(RetrievalResult::empty());
        }
        if vector.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        if !is_finite(vector) {
            return Err(RagError::Validation(
                "query embedding contains non-finite values".into(),
            ));
        }

        let mut scored: Vec<(usize, f32)> = snapshot
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(vector, &e.embedding)))
            .collect();
        // Stable sort: equal scores stay in seq order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: snapshot.entries[i].chunk.clone(),
                score,
            })
            .collect();
        Ok(RetrievalResult { hits })
    }

    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The established embedding dimension, if any entry exists.
    pub fn dimension(&self) -> Option<usize> {
        self.current().dimension
    }

    /// Number of distinct sources with at least one entry.
    pub fn source_count(&self) -> usize {
        let snapshot = self.current();
        snapshot
            .entries
            .iter()
            .map(|e| e.chunk.source.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::Acquire)
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    fn check_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(RagError::IndexUnavailable(
                "index storage failed earlier; restart required".into(),
            ))
        }
    }

    /// Latch the index if `result` reports unreachable storage.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && !self.unavailable.swap(true, Ordering::AcqRel) {
                error!(error = %e, "vector index storage unavailable");
            }
        }
        result
    }
}

fn validate_dimensions(established: Option<usize>, entries: &[IndexEntry]) -> Result<()> {
    let Some(first) = entries.first() else {
        return Ok(());
    };
    let expected = established.unwrap_or(first.dims());
    if expected == 0 {
        return Err(RagError::Validation("embedding must not be empty".into()));
    }
    if let Some(bad) = entries.iter().find(|e| e.dims() != expected) {
        return Err(RagError::DimensionMismatch {
            expected,
            actual: bad.dims(),
        });
    }
    if let Some(bad) = entries.iter().find(|e| !is_finite(&e.embedding)) {
        return Err(RagError::Validation(format!(
            "embedding for {} contains non-finite values",
            bad.chunk.id
        )));
    }
    Ok(())
}

fn stamp(mut entries: Vec<IndexEntry>, first_seq: u64) -> Vec<IndexEntry> {
    let now = chrono::Utc::now().timestamp();
    for (offset, entry) in entries.iter_mut().enumerate() {
        entry.seq = first_seq + offset as u64;
        entry.inserted_at = now;
    }
    entries
}

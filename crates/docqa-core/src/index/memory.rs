//! In-memory [`IndexStore`] implementation for tests and ephemeral runs.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`. Nothing survives the
//! process, but `exists` still follows the flush marker so the build-or-load
//! lifecycle behaves as it does with a durable store.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::IndexEntry;

use super::IndexStore;

#[derive(Default)]
struct State {
    entries: Vec<IndexEntry>,
    built: bool,
}

/// In-memory store for testing.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn exists(&self) -> Result<bool> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.built)
    }

    async fn load(&self) -> Result<Vec<IndexEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries = state.entries.clone();
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }

    async fn append(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.extend_from_slice(entries);
        Ok(())
    }

    async fn replace_source(&self, source: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.retain(|e| e.chunk.source != source);
        state.entries.extend_from_slice(entries);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        state.built = false;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.built = true;
        Ok(())
    }
}

//! SQLite-backed [`IndexStore`] implementation.
//!
//! Entries live in `index_entries`, one row per chunk, with the embedding
//! stored as a little-endian `f32` BLOB. `index_meta` holds the `built_at`
//! marker that makes [`IndexStore::exists`] true.
//!
//! Every mutating call runs in a single transaction. Any SQLite failure is
//! reported as [`RagError::IndexUnavailable`].

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Row, SqlitePool};

use docqa_core::embedding::{blob_to_vec, vec_to_blob};
use docqa_core::index::IndexStore;
use docqa_core::models::{Chunk, IndexEntry};
use docqa_core::{RagError, Result};

use crate::{db, migrate};

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open index database: {}", path.display()))?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn meta(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.map(|r| r.get("value")))
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn unavailable(e: sqlx::Error) -> RagError {
    RagError::IndexUnavailable(e.to_string())
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &IndexEntry,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO index_entries (seq, chunk_id, source, chunk_index, overlap, text, hash,
                                   dims, embedding, inserted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.seq as i64)
    .bind(&entry.chunk.id)
    .bind(&entry.chunk.source)
    .bind(entry.chunk.chunk_index)
    .bind(entry.chunk.overlap as i64)
    .bind(&entry.chunk.text)
    .bind(&entry.chunk.hash)
    .bind(entry.dims() as i64)
    .bind(vec_to_blob(&entry.embedding))
    .bind(entry.inserted_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn exists(&self) -> Result<bool> {
        Ok(self.meta("built_at").await?.is_some())
    }

    async fn load(&self) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, chunk_id, source, chunk_index, overlap, text, hash,
                   dims, embedding, inserted_at
            FROM index_entries
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row.get("seq");
            let dims: i64 = row.get("dims");
            let blob: Vec<u8> = row.get("embedding");
            let embedding = blob_to_vec(&blob)
                .filter(|v| v.len() as i64 == dims)
                .ok_or_else(|| {
                    RagError::IndexUnavailable(format!(
                        "entry {} is corrupt: {} bytes for {} dimensions",
                        seq,
                        blob.len(),
                        dims
                    ))
                })?;
            let overlap: i64 = row.get("overlap");
            entries.push(IndexEntry {
                seq: seq as u64,
                embedding,
                chunk: Chunk {
                    id: row.get("chunk_id"),
                    source: row.get("source"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    overlap: overlap as usize,
                    hash: row.get("hash"),
                },
                inserted_at: row.get("inserted_at"),
            });
        }
        Ok(entries)
    }

    async fn append(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for entry in entries {
            insert_entry(&mut tx, entry).await.map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn replace_source(&self, source: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        sqlx::query("DELETE FROM index_entries WHERE source = ?")
            .bind(source)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        for entry in entries {
            insert_entry(&mut tx, entry).await.map_err(unavailable)?;
        }

        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        sqlx::query("DELETE FROM index_entries")
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.set_meta("built_at", &now).await?;
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::index::VectorIndex;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn entry(source: &str, index: i64, text: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry::new(
            Chunk {
                id: format!("{source}-{index}"),
                source: source.to_string(),
                chunk_index: index,
                text: text.to_string(),
                overlap: index as usize,
                hash: "h".to_string(),
            },
            embedding,
        )
    }

    #[tokio::test]
    async fn test_persisted_index_reloads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("index.sqlite");

        let store = Arc::new(SqliteStore::open(&path).await.unwrap());
        let index = VectorIndex::new(store.clone());
        assert!(!index.exists().await.unwrap());
        index
            .insert(vec![
                entry("a.txt", 0, "alpha", vec![1.0, 0.0, 0.0]),
                entry("a.txt", 1, "beta", vec![0.0, 1.0, 0.0]),
                entry("b.txt", 0, "gamma", vec![0.5, 0.5, 0.5]),
            ])
            .await
            .unwrap();
        index.persist().await.unwrap();
        store.close().await;

        let reopened = Arc::new(SqliteStore::open(&path).await.unwrap());
        let loaded = reopened.load().await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[1].chunk.overlap, 1);
        assert_eq!(loaded[2].embedding, vec![0.5, 0.5, 0.5]);

        let index2 = VectorIndex::new(reopened);
        assert!(index2.exists().await.unwrap());
        index2.load().await.unwrap();
        let q = [0.1, 0.9, 0.2];
        assert_eq!(
            index.query(&q, 3).unwrap().texts(),
            index2.query(&q, 3).unwrap().texts()
        );
    }

    #[tokio::test]
    async fn test_replace_source_only_touches_that_source() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("i.sqlite")).await.unwrap();
        let mut first = vec![
            entry("a.txt", 0, "a0", vec![1.0]),
            entry("b.txt", 0, "b0", vec![1.0]),
        ];
        first[0].seq = 1;
        first[1].seq = 2;
        store.append(&first).await.unwrap();

        let mut replacement = entry("a.txt", 0, "a0-new", vec![1.0]);
        replacement.seq = 3;
        store.replace_source("a.txt", &[replacement]).await.unwrap();

        let texts: Vec<String> = store
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.chunk.text)
            .collect();
        assert_eq!(texts, vec!["b0", "a0-new"]);
    }

    #[tokio::test]
    async fn test_failed_append_commits_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("i.sqlite")).await.unwrap();
        let mut batch = vec![
            entry("a.txt", 0, "x", vec![1.0]),
            entry("a.txt", 1, "y", vec![1.0]),
        ];
        // Duplicate primary key fails the second insert.
        batch[0].seq = 7;
        batch[1].seq = 7;
        let err = store.append(&batch).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_built_marker() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("i.sqlite")).await.unwrap();
        store.flush().await.unwrap();
        assert!(store.exists().await.unwrap());
        store.clear().await.unwrap();
        assert!(!store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_pool_latches_index() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(&tmp.path().join("i.sqlite")).await.unwrap());
        let index = VectorIndex::new(store.clone());
        store.close().await;

        let err = index
            .insert(vec![entry("a.txt", 0, "x", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexUnavailable(_)));
        assert!(!index.is_available());
    }
}

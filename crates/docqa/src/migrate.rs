//! Index database schema (idempotent).

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per indexed chunk; seq is the insertion order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            seq INTEGER PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            overlap INTEGER NOT NULL DEFAULT 0,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            inserted_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Key/value metadata; built_at marks a completed build
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_entries_source ON index_entries(source)")
        .execute(pool)
        .await?;

    Ok(())
}

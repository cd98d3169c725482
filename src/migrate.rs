//! Database schema migrations.
//!
//! A fixed, ordered ladder of schema scripts is applied at open, inside a
//! single transaction, tracked through `PRAGMA user_version`. Databases
//! written by a newer build (version beyond the ladder) fail the open.
//!
//! # Schema
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌───────────────────┐
//! │   sources    │──┐  │    doc_chunks     │──┐  │ doc_chunk_vectors │
//! │              │  │  │                   │  │  │                   │
//! │ id (PK)      │  │  │ ordinal (PK, ai)  │  └──│ chunk_id (PK)     │
//! │ display_name │  └──│ id (UNIQUE)       │     │ dim               │
//! │ file_path    │     │ source_id         │     │ vec (BLOB)        │
//! │ pages        │     │ page              │     └───────────────────┘
//! │ chunks       │     │ content           │
//! │ imported_at  │     │ section_title     │     ┌───────────────────┐
//! └──────────────┘     └─────────┬─────────┘     │   prefix_cache    │
//!                                │               │                   │
//!                      ┌─────────▼─────────┐     │ key (PK)          │
//!                      │  doc_chunks_fts   │     │ value             │
//!                      │  (FTS5, external  │     │ meta              │
//!                      │  content = view   │     │ created_at        │
//!                      │  doc_chunks_aug)  │     └───────────────────┘
//!                      └───────────────────┘
//! ```
//!
//! The FTS mirror is an external-content table over the `doc_chunks_aug`
//! view, which computes `section_title || ' ' || content` per chunk. The
//! FTS `'rebuild'` command therefore regenerates exactly the augmented
//! payloads that ingest inserted.
//!
//! # Legacy vector layout
//!
//! Databases written before vectors were keyed by chunk id carry a
//! `doc_chunk_vectors` table keyed by the chunk's row ordinal. That table
//! is rebuilt at open, preserving every payload by joining legacy rows
//! against current chunk rows on the ordinal.

use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// The migration ladder. Each entry is one migration, as a list of single
/// statements; the database's `user_version` records how many have run.
const MIGRATIONS: &[&[&str]] = &[
    // 1: sources
    &[r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            display_name TEXT,
            file_path TEXT,
            pages INTEGER NOT NULL DEFAULT 0,
            chunks INTEGER NOT NULL DEFAULT 0,
            imported_at TEXT
        )
    "#],
    // 2: doc_chunks with an explicit ordinal. AUTOINCREMENT keeps ordinals
    // monotonic for the lifetime of the database (no rowid reuse), which
    // neighbor expansion depends on.
    &[
        r#"
        CREATE TABLE IF NOT EXISTS doc_chunks (
            ordinal INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            source_id TEXT NOT NULL,
            page INTEGER,
            content TEXT NOT NULL,
            section_title TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (source_id) REFERENCES sources(id)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_doc_chunks_source ON doc_chunks(source_id)",
    ],
    // 3: augmented view + FTS5 mirror
    &[
        r#"
        CREATE VIEW IF NOT EXISTS doc_chunks_aug AS
        SELECT ordinal,
               CASE WHEN section_title != ''
                    THEN section_title || ' ' || content
                    ELSE content
               END AS content,
               source_id,
               section_title
        FROM doc_chunks
        "#,
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS doc_chunks_fts USING fts5(
            content,
            source_id,
            section_title,
            content='doc_chunks_aug',
            content_rowid='ordinal',
            tokenize="unicode61 remove_diacritics 2 tokenchars '-_'"
        )
        "#,
    ],
    // 4: prefix cache
    &[r#"
        CREATE TABLE IF NOT EXISTS prefix_cache (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            meta TEXT NOT NULL,
            created_at TEXT
        )
    "#],
    // 5: vectors keyed by chunk id
    &[r#"
        CREATE TABLE IF NOT EXISTS doc_chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            dim INTEGER NOT NULL,
            vec BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES doc_chunks(id) ON DELETE CASCADE
        )
    "#],
];

/// Run all pending migrations, reconciling the legacy vector layout first.
///
/// The whole pass runs in one transaction with foreign keys enabled on the
/// connection, so a failed migration leaves the database untouched.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    reconcile_legacy_vectors(&mut tx).await?;

    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *tx)
        .await?;

    if version as usize > MIGRATIONS.len() {
        return Err(Error::Storage(format!(
            "database schema version {} is newer than this build supports ({})",
            version,
            MIGRATIONS.len()
        )));
    }

    for (index, migration) in MIGRATIONS.iter().enumerate().skip(version as usize) {
        for statement in *migration {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        debug!(migration = index + 1, "applied schema migration");
    }

    sqlx::query(&format!("PRAGMA user_version = {}", MIGRATIONS.len()))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if (version as usize) < MIGRATIONS.len() {
        info!(
            from = version,
            to = MIGRATIONS.len(),
            "database schema migrated"
        );
    }

    Ok(())
}

/// Rebuild an ordinal-keyed `doc_chunk_vectors` table keyed by chunk id.
///
/// Payloads are preserved by joining legacy rows against current chunk
/// rows on the ordinal (the chunk table's rowid). Runs inside the open
/// transaction; a no-op when the current layout is already present.
async fn reconcile_legacy_vectors(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'doc_chunk_vectors'",
    )
    .fetch_one(&mut **tx)
    .await?;

    if !exists {
        return Ok(());
    }

    let columns = sqlx::query("PRAGMA table_info(doc_chunk_vectors)")
        .fetch_all(&mut **tx)
        .await?;
    let legacy = columns.iter().any(|row| {
        let name: String = row.get("name");
        name == "chunk_ordinal"
    });

    if !legacy {
        return Ok(());
    }

    info!("rebuilding legacy ordinal-keyed vector table");

    sqlx::query(
        r#"
        CREATE TABLE doc_chunk_vectors_new (
            chunk_id TEXT PRIMARY KEY,
            dim INTEGER NOT NULL,
            vec BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES doc_chunks(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO doc_chunk_vectors_new (chunk_id, dim, vec)
        SELECT c.id, v.dim, v.vec
        FROM doc_chunk_vectors v
        JOIN doc_chunks c ON c.rowid = v.chunk_ordinal
        "#,
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query("DROP TABLE doc_chunk_vectors")
        .execute(&mut **tx)
        .await?;
    sqlx::query("ALTER TABLE doc_chunk_vectors_new RENAME TO doc_chunk_vectors")
        .execute(&mut **tx)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::path::Path;

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = db::connect(Path::new(db::MEMORY_PATH)).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_newer_schema_is_fatal() {
        let pool = db::connect(Path::new(db::MEMORY_PATH)).await.unwrap();
        sqlx::query("PRAGMA user_version = 99")
            .execute(&pool)
            .await
            .unwrap();
        let err = run_migrations(&pool).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}

//! SQLite-backed chunk/source store.
//!
//! [`ChunkStore`] owns every SQL statement in the engine: source upserts,
//! chunk inserts with their FTS mirror rows, lexical probes, neighbor and
//! page fetches, the prefix cache, and the vector table.
//!
//! Consistency rules:
//! - every chunk row has exactly one FTS mirror row sharing its ordinal;
//! - deletions remove chunks and rebuild the mirror in one transaction;
//! - vector rows exist only while their chunk row exists (FK cascade).

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{ChunkRecord, FtsHit, Source};

/// Store handle over a shared connection pool.
#[derive(Clone)]
pub struct ChunkStore {
    pool: SqlitePool,
}

impl ChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- sources ----

    /// Upsert a source row by id; every other field is overwritten and the
    /// import timestamp is set to the current wall clock.
    pub async fn insert_source(
        &self,
        id: &str,
        path: Option<&str>,
        display_name: &str,
        pages: i64,
        chunk_count: i64,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO sources (id, display_name, file_path, pages, chunks, imported_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                file_path = excluded.file_path,
                pages = excluded.pages,
                chunks = excluded.chunks,
                imported_at = excluded.imported_at
            "#,
        )
        .bind(id)
        .bind(path)
        .bind(display_name)
        .bind(pages)
        .bind(chunk_count)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove every chunk belonging to `id`, including rows written under
    /// the legacy composite pattern `"<id> p.<n>"`, then rebuild the FTS
    /// mirror. Idempotent; leaves the source row in place.
    pub async fn delete_chunks_for_source(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM doc_chunks WHERE source_id = ?1 OR source_id LIKE ?1 || ' p.%'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("INSERT INTO doc_chunks_fts(doc_chunks_fts) VALUES('rebuild')")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(source = id, deleted, "deleted chunks for source");
        Ok(())
    }

    /// As [`delete_chunks_for_source`](Self::delete_chunks_for_source),
    /// then remove the source row itself.
    pub async fn delete_source(&self, id: &str) -> Result<()> {
        self.delete_chunks_for_source(id).await?;
        sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn fetch_source(&self, id: &str) -> Result<Option<Source>> {
        let row = sqlx::query(
            "SELECT id, display_name, file_path, pages, chunks, imported_at FROM sources WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(source_from_row))
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(
            "SELECT id, display_name, file_path, pages, chunks, imported_at FROM sources ORDER BY imported_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(source_from_row).collect())
    }

    pub async fn count_chunks_for_source(&self, id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doc_chunks WHERE source_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ---- chunks ----

    /// Insert a chunk row and its FTS mirror row in one transaction.
    ///
    /// The mirror payload is `fts_content` when supplied, else the raw
    /// content; both rows share the ordinal the database assigns. Returns
    /// the generated chunk id.
    pub async fn insert(
        &self,
        source_id: &str,
        page: Option<i64>,
        content: &str,
        section_title: Option<&str>,
        fts_content: Option<&str>,
    ) -> Result<String> {
        let chunk_id = Uuid::new_v4().to_string();
        let title = section_title.unwrap_or("");
        let payload = fts_content.unwrap_or(content);

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO doc_chunks (id, source_id, page, content, section_title) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk_id)
        .bind(source_id)
        .bind(page)
        .bind(content)
        .bind(title)
        .execute(&mut *tx)
        .await?;
        let ordinal = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO doc_chunks_fts (rowid, content, source_id, section_title) VALUES (?, ?, ?, ?)",
        )
        .bind(ordinal)
        .bind(payload)
        .bind(source_id)
        .bind(title)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(chunk_id)
    }

    /// Run an FTS `MATCH` probe, ordered by ascending BM25 (lower is
    /// better). The query string is passed through verbatim; FTS5 syntax
    /// errors surface as storage faults.
    ///
    /// Excerpts are snippets of the augmented payload (≤ 18 tokens, `…`
    /// ellipsis) with the leading `section_title + " "` stripped once for
    /// display.
    pub async fn fts_hits(
        &self,
        query: &str,
        source_filter: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FtsHit>> {
        let rows = sqlx::query(
            r#"
            SELECT doc_chunks_fts.rowid AS ordinal,
                   c.id AS chunk_id,
                   c.source_id,
                   c.page,
                   c.section_title,
                   snippet(doc_chunks_fts, 0, '', '', '…', 18) AS excerpt,
                   bm25(doc_chunks_fts) AS score
            FROM doc_chunks_fts
            JOIN doc_chunks c ON c.ordinal = doc_chunks_fts.rowid
            WHERE doc_chunks_fts MATCH ?1
              AND (?2 IS NULL OR c.source_id = ?2)
            ORDER BY bm25(doc_chunks_fts) ASC
            LIMIT ?3
            "#,
        )
        .bind(query)
        .bind(source_filter)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let hits = rows
            .into_iter()
            .map(|row| {
                let section_title: String = row.get("section_title");
                let excerpt: String = row.get("excerpt");
                FtsHit {
                    ordinal: row.get("ordinal"),
                    chunk_id: row.get("chunk_id"),
                    source_id: row.get("source_id"),
                    page: row.get("page"),
                    excerpt: strip_title_prefix(&excerpt, &section_title),
                    bm25: row.get("score"),
                }
            })
            .collect();

        Ok(hits)
    }

    /// Fetch up to `expand` chunks strictly before `around_ordinal`, the
    /// center chunk, then up to `expand` after, all within one source and
    /// in ascending ordinal order. Empty when the center does not exist
    /// for this source.
    pub async fn fetch_neighbors(
        &self,
        source_id: &str,
        around_ordinal: i64,
        expand: i64,
    ) -> Result<Vec<ChunkRecord>> {
        let center = sqlx::query(
            "SELECT ordinal, id, source_id, page, content, section_title
             FROM doc_chunks WHERE source_id = ? AND ordinal = ?",
        )
        .bind(source_id)
        .bind(around_ordinal)
        .fetch_optional(&self.pool)
        .await?;

        let center = match center {
            Some(row) => chunk_from_row(row),
            None => return Ok(Vec::new()),
        };

        let mut before: Vec<ChunkRecord> = sqlx::query(
            "SELECT ordinal, id, source_id, page, content, section_title
             FROM doc_chunks WHERE source_id = ? AND ordinal < ?
             ORDER BY ordinal DESC LIMIT ?",
        )
        .bind(source_id)
        .bind(around_ordinal)
        .bind(expand)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(chunk_from_row)
        .collect();
        before.reverse();

        let after: Vec<ChunkRecord> = sqlx::query(
            "SELECT ordinal, id, source_id, page, content, section_title
             FROM doc_chunks WHERE source_id = ? AND ordinal > ?
             ORDER BY ordinal ASC LIMIT ?",
        )
        .bind(source_id)
        .bind(around_ordinal)
        .bind(expand)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(chunk_from_row)
        .collect();

        let mut window = before;
        window.push(center);
        window.extend(after);
        Ok(window)
    }

    /// All chunks of a source on or after `page`, in ordinal order.
    pub async fn fetch_chunks_from_page(
        &self,
        source_id: &str,
        page: i64,
    ) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT ordinal, id, source_id, page, content, section_title
             FROM doc_chunks WHERE source_id = ? AND page >= ?
             ORDER BY ordinal ASC",
        )
        .bind(source_id)
        .bind(page)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(chunk_from_row).collect())
    }

    /// All chunks of a source, in ordinal order.
    pub async fn fetch_all_chunks(&self, source_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT ordinal, id, source_id, page, content, section_title
             FROM doc_chunks WHERE source_id = ?
             ORDER BY ordinal ASC",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(chunk_from_row).collect())
    }

    /// Ordinal of the first chunk whose content contains `text`,
    /// case-insensitively.
    pub async fn find_anchor_ordinal(
        &self,
        source_id: &str,
        text: &str,
    ) -> Result<Option<i64>> {
        let ordinal: Option<i64> = sqlx::query_scalar(
            "SELECT ordinal FROM doc_chunks
             WHERE source_id = ? AND instr(lower(content), lower(?)) > 0
             ORDER BY ordinal ASC LIMIT 1",
        )
        .bind(source_id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ordinal)
    }

    /// Chunks that have no stored vector, optionally scoped to a source,
    /// in ordinal order.
    pub async fn chunks_missing_vectors(
        &self,
        source_filter: Option<&str>,
    ) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT c.ordinal, c.id, c.source_id, c.page, c.content, c.section_title
            FROM doc_chunks c
            LEFT JOIN doc_chunk_vectors v ON v.chunk_id = c.id
            WHERE v.chunk_id IS NULL
              AND (?1 IS NULL OR c.source_id = ?1)
            ORDER BY c.ordinal ASC
            "#,
        )
        .bind(source_filter)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(chunk_from_row).collect())
    }

    // ---- prefix cache ----

    pub async fn get_cached_prefix(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM prefix_cache WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    pub async fn put_cached_prefix(&self, key: &str, value: &str, meta_json: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO prefix_cache (key, value, meta, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                meta = excluded.meta,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(meta_json)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- vectors ----

    /// Store one vector per chunk, as `dim` little-endian f32 values.
    pub async fn insert_vector(&self, chunk_id: &str, dim: i64, vector: &[f32]) -> Result<()> {
        if vector.len() as i64 != dim {
            return Err(Error::Storage(format!(
                "vector for chunk {} has {} values, declared dim {}",
                chunk_id,
                vector.len(),
                dim
            )));
        }
        let blob = vec_to_blob(vector);
        sqlx::query(
            r#"
            INSERT INTO doc_chunk_vectors (chunk_id, dim, vec)
            VALUES (?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                dim = excluded.dim,
                vec = excluded.vec
            "#,
        )
        .bind(chunk_id)
        .bind(dim)
        .bind(blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch stored vectors for the given chunk ids in one batch. Absent
    /// keys are simply missing from the result; malformed blobs
    /// (`len != 4 * dim`) are storage faults.
    pub async fn fetch_vectors(&self, chunk_ids: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        if chunk_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!(
            "SELECT chunk_id, dim, vec FROM doc_chunk_vectors WHERE chunk_id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in chunk_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut vectors = HashMap::with_capacity(rows.len());
        for row in rows {
            let chunk_id: String = row.get("chunk_id");
            let dim: i64 = row.get("dim");
            let blob: Vec<u8> = row.get("vec");
            let vector = blob_to_vec(&blob, dim as usize)?;
            vectors.insert(chunk_id, vector);
        }
        Ok(vectors)
    }

    /// Drop every stored vector, optionally scoped to a source.
    pub async fn clear_vectors(&self, source_filter: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM doc_chunk_vectors
            WHERE chunk_id IN (
                SELECT id FROM doc_chunks WHERE ?1 IS NULL OR source_id = ?1
            )
            "#,
        )
        .bind(source_filter)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Strip one leading `"{title} "` from a snippet, by literal match.
fn strip_title_prefix(excerpt: &str, section_title: &str) -> String {
    if section_title.is_empty() {
        return excerpt.to_string();
    }
    let prefix = format!("{} ", section_title);
    match excerpt.strip_prefix(&prefix) {
        Some(rest) => rest.to_string(),
        None => excerpt.to_string(),
    }
}

fn source_from_row(row: sqlx::sqlite::SqliteRow) -> Source {
    Source {
        id: row.get("id"),
        display_name: row.get::<Option<String>, _>("display_name").unwrap_or_default(),
        file_path: row.get("file_path"),
        pages: row.get("pages"),
        chunks: row.get("chunks"),
        imported_at: row.get::<Option<String>, _>("imported_at").unwrap_or_default(),
    }
}

fn chunk_from_row(row: sqlx::sqlite::SqliteRow) -> ChunkRecord {
    ChunkRecord {
        ordinal: row.get("ordinal"),
        id: row.get("id"),
        source_id: row.get("source_id"),
        page: row.get("page"),
        content: row.get("content"),
        section_title: row.get("section_title"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_title_prefix() {
        assert_eq!(strip_title_prefix("[a p.1] body", "[a p.1]"), "body");
        assert_eq!(strip_title_prefix("body only", "[a p.1]"), "body only");
        assert_eq!(strip_title_prefix("body", ""), "body");
        // Only the leading occurrence is stripped, exactly once.
        assert_eq!(
            strip_title_prefix("[t] mid [t] end", "[t]"),
            "mid [t] end"
        );
    }
}

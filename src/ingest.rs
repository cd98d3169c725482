//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: loader → page filter → delete-then-insert →
//! chunker → contextual prefix (heuristic, or caller-provided and cached) →
//! chunk insert → optional inline embedding → final source upsert.
//!
//! Re-ingest of a source id replaces it entirely; a run cancelled or failed
//! partway leaves committed rows behind, and the next ingest of the same id
//! recovers by deleting them first. The `sources.chunks` counter reflects
//! completed ingests only: it is written as `0` when the run starts and set
//! to the real count by the final upsert.

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::engine::Folio;
use crate::error::{Error, Result};
use crate::loader::select_loader;
use crate::models::{augment, DocumentInput, DraftChunk, LoadedDocument};

/// Maximum length of a contextual prefix, in characters.
pub const MAX_PREFIX_CHARS: usize = 600;

/// Caller-provided contextual prefix generator (typically LLM-backed).
///
/// A failure or an empty result falls back to the heuristic contextualizer;
/// it never aborts ingest.
#[async_trait]
pub trait PrefixGenerator: Send + Sync {
    async fn generate(
        &self,
        doc: &LoadedDocument,
        page: Option<i64>,
        chunk_text: &str,
    ) -> Result<String>;
}

/// Content-addressed cache key for a chunk's prefix:
/// lowercase hex SHA-256 of `source_id | "|" | page_or_minus_one | "|" | chunk_text`.
pub fn prefix_cache_key(source_id: &str, page: Option<i64>, chunk_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"|");
    hasher.update(page.unwrap_or(-1).to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(chunk_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalize a generated prefix to a single bounded line.
///
/// Newlines become spaces, surrounding whitespace is trimmed, any leading
/// `answer:` markers are dropped case-insensitively, the result is capped
/// at [`MAX_PREFIX_CHARS`] characters, and a lone terminal `.` is removed
/// (ellipses are left alone). Idempotent.
pub fn sanitize_prefix(s: &str) -> String {
    let mut out: String = s.replace(['\n', '\r'], " ").trim().to_string();

    loop {
        match out.get(.."answer:".len()) {
            Some(head) if head.eq_ignore_ascii_case("answer:") => {
                out = out["answer:".len()..].trim_start().to_string();
            }
            _ => break,
        }
    }

    if out.chars().count() > MAX_PREFIX_CHARS {
        out = out.chars().take(MAX_PREFIX_CHARS).collect();
    }
    out = out.trim_end().to_string();

    if out.ends_with('.') && !out.ends_with("..") {
        out.pop();
        out = out.trim_end().to_string();
    }

    out
}

/// Heuristic contextualizer: `[name p.N: heading]`.
///
/// Uses the document name, the 1-based page number, and the first
/// non-trivial line of the page that is not a bare `page N` marker.
pub fn heuristic_prefix(doc_name: &str, page: Option<i64>, page_text: Option<&str>) -> String {
    let label = match page {
        Some(p) => format!("{} p.{}", doc_name, p + 1),
        None => doc_name.to_string(),
    };

    match page_text.and_then(first_heading) {
        Some(heading) => format!("[{}: {}]", label, heading),
        None => format!("[{}]", label),
    }
}

/// First line of a page usable as a heading: at least four characters
/// after trimming and not a bare `page N` marker.
fn first_heading(text: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if line.chars().count() < 4 {
            continue;
        }
        let lower = line.to_lowercase();
        if let Some(rest) = lower.strip_prefix("page ") {
            if rest.trim().chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
        }
        let heading: String = line.chars().take(80).collect();
        return Some(heading.trim_end().to_string());
    }
    None
}

impl Folio {
    /// Ingest a document synchronously: no prefix generator is consulted
    /// and no embedding happens, even when collaborators are configured.
    ///
    /// Returns the number of chunks written.
    pub async fn ingest_sync(&self, input: &DocumentInput, source_id: &str) -> Result<usize> {
        let (doc, chunks) = self.prepare(input, source_id).await?;

        let mut written = 0usize;
        for chunk in &chunks {
            let prefix = self.sync_prefix(&doc, chunk);
            self.insert_chunk(chunk, &prefix).await?;
            written += 1;
        }

        self.finish(input, source_id, &doc, written).await?;
        Ok(written)
    }

    /// Ingest a document, awaiting the configured prefix generator per
    /// chunk (with cache lookups and heuristic fallback) and embedding
    /// each augmented chunk inline when an embedder is configured.
    ///
    /// Returns the number of chunks written.
    pub async fn ingest(&self, input: &DocumentInput, source_id: &str) -> Result<usize> {
        let (doc, chunks) = self.prepare(input, source_id).await?;

        let mut written = 0usize;
        for chunk in &chunks {
            let prefix = self.async_prefix(&doc, chunk).await?;
            let chunk_id = self.insert_chunk(chunk, &prefix).await?;

            if let Some(embedder) = self.embedder() {
                let augmented = augment(&prefix, &chunk.text);
                let vector = embedder.embed(&augmented).await?;
                self.store()
                    .insert_vector(&chunk_id, vector.len() as i64, &vector)
                    .await?;
            }
            written += 1;
        }

        self.finish(input, source_id, &doc, written).await?;
        Ok(written)
    }

    /// Embed every chunk that lacks a stored vector, in batches.
    ///
    /// Scoped to one source when `source_filter` is given. Each batch must
    /// come back with exactly one vector per text; a count mismatch fails
    /// the batch as an embedder fault.
    pub async fn backfill_embeddings(
        &self,
        source_filter: Option<&str>,
        batch: usize,
    ) -> Result<usize> {
        assert!(batch > 0, "batch must be > 0");

        let embedder = self
            .embedder()
            .ok_or_else(|| Error::Input("no embedder configured for backfill".into()))?;

        if let Some(id) = source_filter {
            if self.store().fetch_source(id).await?.is_none() {
                return Err(Error::Input(format!("unknown source id: {}", id)));
            }
        }

        let pending = self.store().chunks_missing_vectors(source_filter).await?;
        let total = pending.len();
        let mut embedded = 0usize;

        for batch_chunks in pending.chunks(batch) {
            let texts: Vec<String> = batch_chunks
                .iter()
                .map(|c| augment(&c.section_title, &c.content))
                .collect();

            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != batch_chunks.len() {
                return Err(Error::Embedder(format!(
                    "embedding count mismatch: {} texts, {} vectors",
                    batch_chunks.len(),
                    vectors.len()
                )));
            }

            for (chunk, vector) in batch_chunks.iter().zip(vectors.iter()) {
                self.store()
                    .insert_vector(&chunk.id, vector.len() as i64, vector)
                    .await?;
                embedded += 1;
            }
        }

        info!(total, embedded, "embedding backfill complete");
        Ok(embedded)
    }

    /// Load, filter, clear the source's previous chunks, upsert the source
    /// with a zero count, and chunk the document.
    async fn prepare(
        &self,
        input: &DocumentInput,
        source_id: &str,
    ) -> Result<(LoadedDocument, Vec<DraftChunk>)> {
        let loader = select_loader(self.loaders(), input)?;
        let mut doc = loader.load(input)?;
        if let Some(filter) = self.page_filter() {
            doc = filter.apply(doc);
        }

        self.store().delete_chunks_for_source(source_id).await?;
        self.store()
            .insert_source(
                source_id,
                input.origin_path().as_deref(),
                &doc.name,
                doc.pages.len() as i64,
                0,
            )
            .await?;

        let chunks = self
            .chunker()
            .chunk(source_id, &doc, &self.config().chunking);
        debug!(
            source = source_id,
            pages = doc.pages.len(),
            chunks = chunks.len(),
            "document prepared for ingest"
        );
        Ok((doc, chunks))
    }

    /// Write one chunk row with its augmented FTS payload.
    async fn insert_chunk(&self, chunk: &DraftChunk, prefix: &str) -> Result<String> {
        let augmented = augment(prefix, &chunk.text);
        self.store()
            .insert(
                &chunk.source_id,
                chunk.page,
                &chunk.text,
                Some(prefix),
                Some(&augmented),
            )
            .await
    }

    /// Final source upsert with the real chunk count.
    async fn finish(
        &self,
        input: &DocumentInput,
        source_id: &str,
        doc: &LoadedDocument,
        written: usize,
    ) -> Result<()> {
        self.store()
            .insert_source(
                source_id,
                input.origin_path().as_deref(),
                &doc.name,
                doc.pages.len() as i64,
                written as i64,
            )
            .await?;
        info!(source = source_id, chunks = written, "ingest complete");
        Ok(())
    }

    /// Heuristic prefix, or empty when contextual prefixing is disabled.
    fn sync_prefix(&self, doc: &LoadedDocument, chunk: &DraftChunk) -> String {
        if !self.config().indexing.use_contextual_prefix {
            return String::new();
        }
        let page_text = chunk
            .page
            .and_then(|p| doc.pages.iter().find(|page| page.index == p))
            .map(|page| page.text.as_str());
        heuristic_prefix(&doc.name, chunk.page, page_text)
    }

    /// Resolve a chunk's prefix on the async path: cache hit, else the
    /// caller's generator (sanitized, cached, heuristic on failure or
    /// empty result), else the heuristic contextualizer.
    async fn async_prefix(&self, doc: &LoadedDocument, chunk: &DraftChunk) -> Result<String> {
        if !self.config().indexing.use_contextual_prefix {
            return Ok(String::new());
        }

        let key = prefix_cache_key(&chunk.source_id, chunk.page, &chunk.text);
        if let Some(cached) = self.store().get_cached_prefix(&key).await? {
            return Ok(cached);
        }

        let generator = match self.prefix_generator() {
            Some(g) => g,
            None => return Ok(self.sync_prefix(doc, chunk)),
        };

        let generated = match generator.generate(doc, chunk.page, &chunk.text).await {
            Ok(raw) => sanitize_prefix(&raw),
            Err(e) => {
                warn!(source = %chunk.source_id, "prefix generator failed: {}", e);
                String::new()
            }
        };

        if generated.is_empty() {
            return Ok(self.sync_prefix(doc, chunk));
        }

        let meta = json!({
            "model": "user-provided",
            "rev": "v1",
            "chars": generated.chars().count(),
        });
        self.store()
            .put_cached_prefix(&key, &generated, &meta.to_string())
            .await?;

        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_newlines_and_trims() {
        assert_eq!(sanitize_prefix("  a\nb\r\nc  "), "a b  c");
    }

    #[test]
    fn test_sanitize_drops_answer_marker() {
        assert_eq!(sanitize_prefix("Answer: the gist"), "the gist");
        assert_eq!(sanitize_prefix("ANSWER: answer: twice"), "twice");
    }

    #[test]
    fn test_sanitize_trims_one_trailing_period() {
        assert_eq!(sanitize_prefix("A summary."), "A summary");
        // Ellipses are not eaten one dot at a time.
        assert_eq!(sanitize_prefix("And so on..."), "And so on...");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(700);
        assert_eq!(sanitize_prefix(&long).chars().count(), MAX_PREFIX_CHARS);
    }

    #[test]
    fn test_sanitize_idempotent() {
        let long = "y".repeat(1000);
        let inputs = [
            "  a\nb  ",
            "Answer: answer: ok.",
            "plain",
            "trailing.",
            "dots...",
            "",
            "   ",
            long.as_str(),
        ];
        for input in inputs {
            let once = sanitize_prefix(input);
            assert_eq!(sanitize_prefix(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_cache_key_shape_and_page_placeholder() {
        let with_page = prefix_cache_key("src", Some(3), "text");
        let no_page = prefix_cache_key("src", None, "text");
        assert_eq!(with_page.len(), 64);
        assert!(with_page.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(with_page, no_page);

        // The no-page placeholder is the literal -1.
        let mut hasher = Sha256::new();
        hasher.update(b"src|-1|text");
        assert_eq!(no_page, format!("{:x}", hasher.finalize()));
    }

    #[test]
    fn test_heuristic_prefix_formats() {
        assert_eq!(heuristic_prefix("doc.pdf", None, None), "[doc.pdf]");
        assert_eq!(heuristic_prefix("doc.pdf", Some(2), None), "[doc.pdf p.3]");
        assert_eq!(
            heuristic_prefix("doc.pdf", Some(0), Some("Page 1\nIntroduction\nbody")),
            "[doc.pdf p.1: Introduction]"
        );
    }

    #[test]
    fn test_heuristic_skips_trivial_lines() {
        let page = "ok\npage 12\n\nChapter One\nmore";
        assert_eq!(
            heuristic_prefix("d", Some(0), Some(page)),
            "[d p.1: Chapter One]"
        );
    }
}

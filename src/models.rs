//! Core data models used throughout folio.
//!
//! These types represent the documents, chunks, and results that flow
//! through the ingestion and retrieval pipeline:
//!
//! ```text
//! DocumentInput → Loader → LoadedDocument → Chunker → DraftChunk
//!                                                         ↓
//!                                            store.insert → ChunkRecord
//!                                                         ↓
//!                                    fts_hits → FtsHit → Passage
//! ```

use serde::Serialize;

/// Raw ingest input handed to a [`Loader`](crate::loader::Loader).
///
/// `Text` carries inline content with a display name; `File` points at a
/// document on disk and is dispatched on extension by the built-in loaders.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    Text { text: String, name: String },
    File(std::path::PathBuf),
}

impl DocumentInput {
    /// Display name for the input: the inline name, or the file name.
    pub fn display_name(&self) -> String {
        match self {
            DocumentInput::Text { name, .. } => name.clone(),
            DocumentInput::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    /// Origin path, when the input came from disk.
    pub fn origin_path(&self) -> Option<String> {
        match self {
            DocumentInput::Text { .. } => None,
            DocumentInput::File(path) => Some(path.display().to_string()),
        }
    }
}

/// One page of a loaded document. Plain-text inputs load as a single page 0.
#[derive(Debug, Clone)]
pub struct Page {
    /// Zero-based page index.
    pub index: i64,
    /// Page text.
    pub text: String,
}

/// A decoded document produced by a [`Loader`](crate::loader::Loader).
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Human-readable document name (typically the file name).
    pub name: String,
    /// Pages in order. Never empty for a successfully loaded document.
    pub pages: Vec<Page>,
}

/// A chunk emitted by a [`Chunker`](crate::chunk::Chunker), before storage.
#[derive(Debug, Clone)]
pub struct DraftChunk {
    /// Source the chunk belongs to.
    pub source_id: String,
    /// Page the chunk came from, when known.
    pub page: Option<i64>,
    /// Chunk text.
    pub text: String,
}

/// A source row: the logical grouping of all chunks from one document.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    /// Caller-chosen opaque id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Origin path, when the document came from disk.
    pub file_path: Option<String>,
    /// Page count at import time.
    pub pages: i64,
    /// Chunk count after the last completed ingest.
    pub chunks: i64,
    /// Import timestamp (RFC 3339).
    pub imported_at: String,
}

/// A stored chunk row, as returned by neighbor and document fetches.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Generated chunk id.
    pub id: String,
    /// Insertion-order ordinal; defines adjacency within a source.
    pub ordinal: i64,
    /// Owning source id.
    pub source_id: String,
    /// Page index, when known.
    pub page: Option<i64>,
    /// Raw chunk text (without the contextual prefix).
    pub content: String,
    /// Contextual prefix stored alongside the chunk; empty when none.
    pub section_title: String,
}

/// A lexical hit from the FTS index.
#[derive(Debug, Clone)]
pub struct FtsHit {
    /// Ordinal of the matching chunk.
    pub ordinal: i64,
    /// Id of the matching chunk.
    pub chunk_id: String,
    /// Owning source id.
    pub source_id: String,
    /// Page index, when known.
    pub page: Option<i64>,
    /// Display excerpt with the section-title prefix stripped.
    pub excerpt: String,
    /// Raw BM25 score from FTS5 (lower is better).
    pub bm25: f64,
}

/// A neighbor-expanded passage returned by contextual and hybrid search.
#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    /// Owning source id.
    pub source_id: String,
    /// First page of the neighbor window, when known.
    pub page: Option<i64>,
    /// Window texts joined by blank lines.
    pub text: String,
    /// Excerpt of the hit that seeded the window.
    pub excerpt: String,
    /// Raw BM25 of the seeding hit (lower is better).
    pub bm25: f64,
    /// Cosine similarity of the seeding hit, when hybrid scoring ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cosine: Option<f64>,
    /// Fused score, when hybrid scoring ran (higher is better).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A coherent slice of one source, as assembled by document fetch.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSlice {
    /// Source id.
    pub source_id: String,
    /// Source display name.
    pub display_name: String,
    /// Ids of the chunks in the slice, in ordinal order.
    pub chunk_ids: Vec<String>,
    /// Chunk texts joined by blank lines, possibly truncated.
    pub text: String,
    /// Minimum page across the slice, when any chunk has a page.
    pub start_page: Option<i64>,
    /// Maximum page across the slice, when any chunk has a page.
    pub end_page: Option<i64>,
}

/// Augment chunk text with its contextual prefix.
///
/// This is the exact payload indexed for lexical search and embedded for
/// cosine search: `"{prefix} {content}"` when a prefix exists, else the
/// bare content. The prefix never carries a trailing space of its own.
pub fn augment(section_title: &str, content: &str) -> String {
    if section_title.is_empty() {
        content.to_string()
    } else {
        format!("{} {}", section_title, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augment_empty_prefix() {
        assert_eq!(augment("", "body"), "body");
    }

    #[test]
    fn test_augment_with_prefix() {
        assert_eq!(augment("[doc p.1]", "body"), "[doc p.1] body");
    }

    #[test]
    fn test_display_name_from_file() {
        let input = DocumentInput::File("/tmp/a/report.pdf".into());
        assert_eq!(input.display_name(), "report.pdf");
        assert_eq!(input.origin_path().as_deref(), Some("/tmp/a/report.pdf"));
    }
}

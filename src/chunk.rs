//! Chunking: splitting loaded documents into retrieval units.
//!
//! The [`Chunker`] trait is the seam for custom splitting strategies; the
//! engine only relies on chunk order being insertion order. The built-in
//! [`ParagraphChunker`] packs paragraphs (`\n\n` boundaries) into chunks
//! that respect the configured token budget, hard-splitting oversized
//! paragraphs at word boundaries with a character overlap between pieces.

use crate::config::ChunkingConfig;
use crate::models::{DraftChunk, LoadedDocument};

/// Splitting strategy contract.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks. Order is insertion order.
    fn chunk(
        &self,
        source_id: &str,
        doc: &LoadedDocument,
        config: &ChunkingConfig,
    ) -> Vec<DraftChunk>;
}

/// Paragraph-boundary chunker operating page by page.
#[derive(Debug, Default)]
pub struct ParagraphChunker;

impl Chunker for ParagraphChunker {
    fn chunk(
        &self,
        source_id: &str,
        doc: &LoadedDocument,
        config: &ChunkingConfig,
    ) -> Vec<DraftChunk> {
        let max_chars = config.max_chars().max(1);
        let overlap_chars = config.overlap_chars();
        let mut chunks = Vec::new();

        for page in &doc.pages {
            for piece in split_page(&page.text, max_chars, overlap_chars) {
                chunks.push(DraftChunk {
                    source_id: source_id.to_string(),
                    page: Some(page.index),
                    text: piece,
                });
            }
        }

        chunks
    }
}

/// Split one page's text into pieces of at most `max_chars` characters.
fn split_page(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.chars().count()
        } else {
            buf.chars().count() + 2 + trimmed.chars().count()
        };

        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if trimmed.chars().count() > max_chars {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            hard_split(trimmed, max_chars, overlap_chars, &mut pieces);
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
}

/// Hard-split an oversized paragraph at word boundaries, carrying
/// `overlap_chars` characters of context between consecutive pieces.
fn hard_split(text: &str, max_chars: usize, overlap_chars: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    let overlap = overlap_chars.min(max_chars.saturating_sub(1));
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());

        // Prefer a whitespace boundary when we are mid-text.
        let split_at = if end < chars.len() {
            chars[start..end]
                .iter()
                .rposition(|c| c.is_whitespace())
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        let piece: String = chars[start..split_at].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            out.push(piece);
        }

        if split_at >= chars.len() {
            break;
        }
        start = split_at.saturating_sub(overlap).max(start + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Page;

    fn doc(pages: &[&str]) -> LoadedDocument {
        LoadedDocument {
            name: "test.txt".into(),
            pages: pages
                .iter()
                .enumerate()
                .map(|(i, text)| Page {
                    index: i as i64,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    fn config(max_tokens: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_tokens_per_chunk: max_tokens,
            overlap_tokens: overlap,
        }
    }

    #[test]
    fn test_small_page_single_chunk() {
        let chunks = ParagraphChunker.chunk("s1", &doc(&["Hello, world!"]), &config(650, 80));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].page, Some(0));
        assert_eq!(chunks[0].source_id, "s1");
    }

    #[test]
    fn test_empty_pages_yield_nothing() {
        let chunks = ParagraphChunker.chunk("s1", &doc(&["", "  \n\n  "]), &config(650, 80));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_paragraphs_packed_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = ParagraphChunker.chunk("s1", &doc(&[text]), &config(650, 80));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn test_paragraphs_split_over_limit() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        // ~10 tokens ≈ 36 chars per chunk.
        let chunks = ParagraphChunker.chunk("s1", &doc(&[text]), &config(10, 0));
        assert!(chunks.len() > 1);
    }

    #[test]
    fn test_oversized_paragraph_hard_split_respects_budget() {
        let word = "alpha ";
        let text = word.repeat(100);
        let cfg = config(10, 2);
        let chunks = ParagraphChunker.chunk("s1", &doc(&[&text]), &cfg);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= cfg.max_chars());
        }
    }

    #[test]
    fn test_pages_keep_their_index() {
        let chunks =
            ParagraphChunker.chunk("s1", &doc(&["page zero", "page one"]), &config(650, 80));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, Some(0));
        assert_eq!(chunks[1].page, Some(1));
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = ParagraphChunker.chunk("s1", &doc(&[text]), &config(2, 0));
        let b = ParagraphChunker.chunk("s1", &doc(&[text]), &config(2, 0));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
        }
    }
}

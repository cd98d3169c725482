//! Retrieval: lexical search, hybrid search, and passage assembly.
//!
//! All three search entry points share the same shape: probe the FTS index
//! for an oversized candidate pool, order the candidates (by BM25 alone or
//! by fused score), then walk them emitting neighbor-expanded passages
//! until `limit` is reached. Ordinals consumed by an emitted window are
//! never reused, so passages are pairwise disjoint.
//!
//! `fetch_document` assembles a coherent slice of one source for display
//! or prompt grounding, resolved by anchor text, start page, or whole
//! document, in that order of precedence.

use std::collections::HashSet;

use tracing::debug;

use crate::embedding::cosine;
use crate::engine::Folio;
use crate::error::{Error, Result};
use crate::fusion;
use crate::models::{DocumentSlice, FtsHit, Passage};

/// Floor of the BM25 candidate pool probed before passage assembly.
const MIN_CANDIDATE_POOL: i64 = 60;

/// Candidate pool size for a requested result count.
fn candidate_pool(limit: i64) -> i64 {
    (limit * 6).max(MIN_CANDIDATE_POOL)
}

impl Folio {
    /// Lexical search: the top `limit` FTS snippets, best BM25 first.
    pub async fn search(
        &self,
        query: &str,
        source_filter: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FtsHit>> {
        assert!(limit > 0, "limit must be > 0");
        self.store().fts_hits(query, source_filter, limit).await
    }

    /// BM25-only passage retrieval: walk hits best-first, expanding each
    /// surviving hit into a ±`expand` neighbor window within its source.
    pub async fn search_with_context(
        &self,
        query: &str,
        source_filter: Option<&str>,
        limit: i64,
        expand: i64,
    ) -> Result<Vec<Passage>> {
        assert!(limit > 0, "limit must be > 0");
        assert!(expand >= 0, "expand must be >= 0");

        let hits = self
            .store()
            .fts_hits(query, source_filter, candidate_pool(limit))
            .await?;
        let ordered: Vec<(FtsHit, Option<f64>, Option<f64>)> =
            hits.into_iter().map(|h| (h, None, None)).collect();

        self.assemble_passages(ordered, expand, limit as usize).await
    }

    /// Hybrid passage retrieval: re-score the BM25 candidate pool with
    /// cosine similarity against stored vectors, fuse, then assemble
    /// windows in fused order.
    ///
    /// `w_bm25` defaults to the configured weight. Without an embedder the
    /// cosine leg is skipped and ordering degenerates to BM25.
    pub async fn search_hybrid(
        &self,
        query: &str,
        source_filter: Option<&str>,
        limit: i64,
        expand: i64,
        w_bm25: Option<f64>,
    ) -> Result<Vec<Passage>> {
        assert!(limit > 0, "limit must be > 0");
        assert!(expand >= 0, "expand must be >= 0");
        let w = w_bm25.unwrap_or(self.config().hybrid.w_bm25);
        assert!((0.0..=1.0).contains(&w), "w_bm25 must be in [0, 1]");

        let hits = self
            .store()
            .fts_hits(query, source_filter, candidate_pool(limit))
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let cosines: Vec<Option<f64>> = match self.embedder() {
            Some(embedder) => {
                let query_vec = embedder.embed(query).await?;
                let ids: Vec<String> = hits.iter().map(|h| h.chunk_id.clone()).collect();
                let vectors = self.store().fetch_vectors(&ids).await?;
                hits.iter()
                    .map(|h| vectors.get(&h.chunk_id).map(|v| cosine(&query_vec, v)))
                    .collect()
            }
            None => vec![None; hits.len()],
        };

        let candidates: Vec<(usize, i64, f64, Option<f64>)> = hits
            .iter()
            .enumerate()
            .map(|(i, h)| (i, h.ordinal, h.bm25, cosines[i]))
            .collect();
        let ranked = fusion::rank(&candidates, w);
        debug!(candidates = ranked.len(), w_bm25 = w, "hybrid candidates ranked");

        let mut hits: Vec<Option<FtsHit>> = hits.into_iter().map(Some).collect();
        let ordered: Vec<(FtsHit, Option<f64>, Option<f64>)> = ranked
            .into_iter()
            .map(|r| {
                let hit = hits[r.index].take().expect("candidate indexes are unique");
                (hit, r.cosine, Some(r.fused))
            })
            .collect();

        self.assemble_passages(ordered, expand, limit as usize).await
    }

    /// Assemble a coherent slice of one source.
    ///
    /// Cursor resolution: a non-empty `anchor` locates the first matching
    /// chunk and takes its ±`expand` neighbors; else a `start_page` takes
    /// every chunk from that page on; else the whole source. The joined
    /// text is truncated to `max_chars` characters when set.
    pub async fn fetch_document(
        &self,
        source_id: &str,
        start_page: Option<i64>,
        anchor: Option<&str>,
        expand: i64,
        max_chars: Option<usize>,
    ) -> Result<DocumentSlice> {
        assert!((0..=8).contains(&expand), "expand must be in [0, 8]");
        if let Some(p) = start_page {
            assert!(p >= 0, "start_page must be >= 0");
        }
        if let Some(m) = max_chars {
            assert!(m > 0, "max_chars must be > 0");
        }

        let source = self
            .store()
            .fetch_source(source_id)
            .await?
            .ok_or_else(|| Error::Input(format!("unknown source id: {}", source_id)))?;

        let anchor = anchor.map(str::trim).filter(|a| !a.is_empty());
        let chunks = if let Some(anchor) = anchor {
            match self.store().find_anchor_ordinal(source_id, anchor).await? {
                Some(ordinal) => {
                    self.store()
                        .fetch_neighbors(source_id, ordinal, expand)
                        .await?
                }
                None => Vec::new(),
            }
        } else if let Some(page) = start_page {
            self.store().fetch_chunks_from_page(source_id, page).await?
        } else {
            self.store().fetch_all_chunks(source_id).await?
        };

        if chunks.is_empty() {
            return Ok(DocumentSlice {
                source_id: source_id.to_string(),
                display_name: source.display_name,
                chunk_ids: Vec::new(),
                text: String::new(),
                start_page: None,
                end_page: None,
            });
        }

        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let pages: Vec<i64> = chunks.iter().filter_map(|c| c.page).collect();
        let mut text = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        if let Some(max) = max_chars {
            if text.chars().count() > max {
                text = text.chars().take(max).collect();
            }
        }

        Ok(DocumentSlice {
            source_id: source_id.to_string(),
            display_name: source.display_name,
            chunk_ids,
            text,
            start_page: pages.iter().min().copied(),
            end_page: pages.iter().max().copied(),
        })
    }

    /// Walk ordered candidates, expanding each into a neighbor window and
    /// skipping any hit whose ordinal a previous window already covered.
    async fn assemble_passages(
        &self,
        ordered: Vec<(FtsHit, Option<f64>, Option<f64>)>,
        expand: i64,
        limit: usize,
    ) -> Result<Vec<Passage>> {
        let mut used: HashSet<i64> = HashSet::new();
        let mut passages = Vec::new();

        for (hit, cos, fused) in ordered {
            if passages.len() >= limit {
                break;
            }
            if used.contains(&hit.ordinal) {
                continue;
            }

            let mut window = self
                .store()
                .fetch_neighbors(&hit.source_id, hit.ordinal, expand)
                .await?;
            // Neighbors already claimed by an earlier window stay there;
            // emitted windows must be pairwise disjoint.
            window.retain(|c| !used.contains(&c.ordinal));
            if window.is_empty() {
                continue;
            }

            for chunk in &window {
                used.insert(chunk.ordinal);
            }

            let text = window
                .iter()
                .map(|c| c.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            passages.push(Passage {
                source_id: hit.source_id,
                page: window.first().and_then(|c| c.page),
                text,
                excerpt: hit.excerpt,
                bm25: hit.bm25,
                cosine: cos,
                score: fused,
            });
        }

        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_pool_floor() {
        assert_eq!(candidate_pool(1), 60);
        assert_eq!(candidate_pool(10), 60);
        assert_eq!(candidate_pool(11), 66);
        assert_eq!(candidate_pool(50), 300);
    }
}

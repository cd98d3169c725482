//! # Folio
//!
//! **An embedded retrieval engine for on-device document corpora.**
//!
//! Folio ingests documents (plain text and digital-text PDFs), splits them
//! into chunks, optionally augments each chunk with a short contextual
//! prefix, indexes the augmented text into SQLite FTS5, optionally stores
//! per-chunk dense vectors, and serves lexical (BM25), hybrid
//! (BM25 + cosine with rank fusion), and neighbor-expanded passage
//! retrieval — all against a single database file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌─────────────────┐
//! │   Loaders   │──▶│     Pipeline     │──▶│     SQLite      │
//! │  Text/PDF   │   │ Chunk+Prefix+Emb │   │ FTS5 + vectors  │
//! └─────────────┘   └──────────────────┘   └────────┬────────┘
//!                                                   │
//!                              ┌────────────────────┤
//!                              ▼                    ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │    search    │     │    fetch     │
//!                      │ bm25/hybrid  │     │  documents   │
//!                      └──────────────┘     └──────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. A [`models::DocumentInput`] is decoded by the first accepting
//!    [`loader::Loader`] into a [`models::LoadedDocument`].
//! 2. The [`chunk::Chunker`] splits pages into [`models::DraftChunk`]s.
//! 3. Ingest computes a contextual prefix per chunk (heuristic, or a
//!    caller-provided [`ingest::PrefixGenerator`] memoized in the prefix
//!    cache) and inserts `prefix + content` into the FTS mirror.
//! 4. When an [`embedding::Embedder`] is configured, the augmented text is
//!    embedded and stored as a little-endian f32 blob keyed by chunk id.
//! 5. Queries probe FTS5 for a BM25 candidate pool; hybrid search
//!    re-scores candidates by cosine and fuses the two with [`fusion`].
//! 6. Hits grow into passages by pulling adjacent chunks of the same
//!    source ([`retrieval`]), deduplicated by ordinal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio::{DocumentInput, Folio, FolioConfig};
//!
//! # async fn example() -> folio::Result<()> {
//! let engine = Folio::open_in_memory(FolioConfig::default()).await?;
//!
//! let note = DocumentInput::Text {
//!     text: "hello world from folio".into(),
//!     name: "note.txt".into(),
//! };
//! engine.ingest_sync(&note, "T1").await?;
//!
//! let hits = engine.search("hello", Some("T1"), 5).await?;
//! let passages = engine.search_with_context("hello", None, 3, 1).await?;
//! # let _ = (hits, passages);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Engine configuration (chunking, indexing, hybrid knobs) |
//! | [`models`] | Core data types: sources, chunks, hits, passages |
//! | [`loader`] | `Loader` trait, text and PDF loaders, page filter hook |
//! | [`chunk`] | `Chunker` trait and the paragraph-boundary chunker |
//! | [`embedding`] | `Embedder` trait, vector blob codec, cosine |
//! | [`ingest`] | Ingest orchestration, prefix cache, sanitizer, backfill |
//! | [`fusion`] | BM25/cosine normalization and rank fusion |
//! | [`retrieval`] | Search entry points and document fetch |
//! | [`store`] | Every SQL statement: chunks, FTS mirror, cache, vectors |
//! | [`db`] | Pool construction, WAL mode, default database path |
//! | [`migrate`] | Schema migration ladder and legacy reconciliation |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod ingest;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod store;

pub use config::{load_config, FolioConfig};
pub use embedding::Embedder;
pub use engine::Folio;
pub use error::{Error, Result};
pub use ingest::PrefixGenerator;
pub use models::{
    DocumentInput, DocumentSlice, FtsHit, LoadedDocument, Page, Passage, Source,
};

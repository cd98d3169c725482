//! The `Folio` engine handle.
//!
//! One `Folio` owns a database pool (schema migrated at open), the engine
//! configuration, and the pluggable collaborators: loaders, the chunker,
//! an optional page filter, an optional embedder, and an optional prefix
//! generator. Ingest entry points live in [`crate::ingest`], search entry
//! points in [`crate::retrieval`].

use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::chunk::{Chunker, ParagraphChunker};
use crate::config::FolioConfig;
use crate::db;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::ingest::PrefixGenerator;
use crate::loader::{Loader, PageFilter, PdfLoader, TextLoader};
use crate::migrate;
use crate::models::Source;
use crate::store::ChunkStore;

/// Embedded retrieval engine over one SQLite database.
pub struct Folio {
    store: ChunkStore,
    config: FolioConfig,
    loaders: Vec<Box<dyn Loader>>,
    chunker: Box<dyn Chunker>,
    page_filter: Option<Box<dyn PageFilter>>,
    embedder: Option<Arc<dyn Embedder>>,
    prefix_generator: Option<Arc<dyn PrefixGenerator>>,
}

impl Folio {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// The path `:memory:` opens an in-memory database; see
    /// [`db::default_db_path`] for the default on-disk location.
    pub async fn open(path: &Path, config: FolioConfig) -> Result<Self> {
        config.validate()?;
        let pool = db::connect(path).await?;
        Self::from_pool(pool, config).await
    }

    /// Open an in-memory engine. Mostly useful in tests.
    pub async fn open_in_memory(config: FolioConfig) -> Result<Self> {
        Self::open(Path::new(db::MEMORY_PATH), config).await
    }

    /// Build an engine over an existing pool, running migrations on it.
    pub async fn from_pool(pool: SqlitePool, config: FolioConfig) -> Result<Self> {
        config.validate()?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            store: ChunkStore::new(pool),
            config,
            loaders: vec![Box::new(TextLoader), Box::new(PdfLoader)],
            chunker: Box::new(ParagraphChunker),
            page_filter: None,
            embedder: None,
            prefix_generator: None,
        })
    }

    /// Configure the embedding backend used by ingest, backfill, and
    /// hybrid search.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Configure the caller-provided contextual prefix generator.
    pub fn with_prefix_generator(mut self, generator: Arc<dyn PrefixGenerator>) -> Self {
        self.prefix_generator = Some(generator);
        self
    }

    /// Register an additional loader, consulted before the built-ins.
    pub fn with_loader(mut self, loader: Box<dyn Loader>) -> Self {
        self.loaders.insert(0, loader);
        self
    }

    /// Replace the chunking strategy.
    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// Install a header/footer page filter, applied before chunking.
    pub fn with_page_filter(mut self, filter: Box<dyn PageFilter>) -> Self {
        self.page_filter = Some(filter);
        self
    }

    /// Delete a source and all of its chunks (and, by cascade, vectors).
    pub async fn delete_source(&self, source_id: &str) -> Result<()> {
        self.store.delete_source(source_id).await
    }

    /// Look up one source's metadata.
    pub async fn fetch_source(&self, source_id: &str) -> Result<Option<Source>> {
        self.store.fetch_source(source_id).await
    }

    /// All sources, most recently imported first.
    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        self.store.list_sources().await
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    pub(crate) fn loaders(&self) -> &[Box<dyn Loader>] {
        &self.loaders
    }

    pub(crate) fn chunker(&self) -> &dyn Chunker {
        self.chunker.as_ref()
    }

    pub(crate) fn page_filter(&self) -> Option<&dyn PageFilter> {
        self.page_filter.as_deref()
    }

    pub(crate) fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.embedder.as_ref()
    }

    pub(crate) fn prefix_generator(&self) -> Option<&Arc<dyn PrefixGenerator>> {
        self.prefix_generator.as_ref()
    }
}

//! Error types for folio operations.

use thiserror::Error;

/// Main error type for the retrieval engine.
///
/// Precondition violations (`limit <= 0`, out-of-range `expand`, and the
/// like) are programmer errors and panic instead of surfacing here.
#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported ingest input, unknown source id, or a collaborator that
    /// was requested but never configured.
    #[error("input error: {0}")]
    Input(String),

    /// A loader accepted the input but could not decode it.
    #[error("loader error: {0}")]
    Loader(String),

    /// Migration failure, constraint violation, or malformed stored data.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedding adapter failure, or a count/dimensionality mismatch
    /// between requested texts and returned vectors.
    #[error("embedder error: {0}")]
    Embedder(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

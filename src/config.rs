use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

/// Approximate chars-per-token ratio used when converting token budgets
/// to character budgets.
pub const CHARS_PER_TOKEN: f64 = 3.6;

/// Engine configuration.
///
/// All sections have serde defaults, so an empty TOML file (or
/// `FolioConfig::default()`) yields a working configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FolioConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub hybrid: HybridConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum tokens per chunk.
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_chunk: usize,
    /// Token overlap between adjacent chunks produced by a hard split.
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    /// Character budget per chunk.
    pub fn max_chars(&self) -> usize {
        (self.max_tokens_per_chunk as f64 * CHARS_PER_TOKEN) as usize
    }

    /// Character overlap for hard splits.
    pub fn overlap_chars(&self) -> usize {
        (self.overlap_tokens as f64 * CHARS_PER_TOKEN) as usize
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexingConfig {
    /// Whether ingest computes a contextual prefix for each chunk.
    #[serde(default)]
    pub use_contextual_prefix: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HybridConfig {
    /// Weight of the lexical component in rank fusion, in `[0, 1]`.
    #[serde(default = "default_w_bm25")]
    pub w_bm25: f64,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            w_bm25: default_w_bm25(),
        }
    }
}

fn default_max_tokens() -> usize {
    650
}
fn default_overlap() -> usize {
    80
}
fn default_w_bm25() -> f64 {
    0.5
}

impl FolioConfig {
    /// Check all knobs are in range.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens_per_chunk == 0 {
            return Err(Error::Config(
                "chunking.max_tokens_per_chunk must be > 0".into(),
            ));
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens_per_chunk {
            return Err(Error::Config(
                "chunking.overlap_tokens must be < max_tokens_per_chunk".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.hybrid.w_bm25) {
            return Err(Error::Config("hybrid.w_bm25 must be in [0.0, 1.0]".into()));
        }
        Ok(())
    }
}

/// Load and validate a configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<FolioConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: FolioConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FolioConfig::default();
        assert_eq!(config.chunking.max_tokens_per_chunk, 650);
        assert_eq!(config.chunking.overlap_tokens, 80);
        assert!(!config.indexing.use_contextual_prefix);
        assert!((config.hybrid.w_bm25 - 0.5).abs() < f64::EPSILON);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: FolioConfig = toml::from_str(
            r#"
            [chunking]
            max_tokens_per_chunk = 300

            [indexing]
            use_contextual_prefix = true
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.max_tokens_per_chunk, 300);
        assert_eq!(config.chunking.overlap_tokens, 80);
        assert!(config.indexing.use_contextual_prefix);
    }

    #[test]
    fn test_validate_rejects_bad_weight() {
        let mut config = FolioConfig::default();
        config.hybrid.w_bm25 = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_to_char_conversion() {
        let chunking = ChunkingConfig {
            max_tokens_per_chunk: 100,
            overlap_tokens: 10,
        };
        assert_eq!(chunking.max_chars(), 360);
        assert_eq!(chunking.overlap_chars(), 36);
    }
}

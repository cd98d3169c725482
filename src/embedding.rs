//! Embedding backend abstraction and vector utilities.
//!
//! The engine never talks to an embedding model directly: callers hand it
//! an [`Embedder`] implementation (a network adapter, a local model, a test
//! stub) and folio drives it with augmented chunk texts during ingest and
//! backfill, and with query text during hybrid search.
//!
//! Also provides the vector blob codec used by the vector table:
//! - [`vec_to_blob`] — encode a `&[f32]` as little-endian bytes
//! - [`blob_to_vec`] — decode a stored blob, rejecting malformed shapes
//! - [`cosine`] — cosine similarity with double-precision accumulators

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Dense-vector embedding backend.
///
/// Implementations may fail on network or model errors; the engine surfaces
/// those as ingest or retrieval failures without retrying.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Encode a float vector as a BLOB of little-endian f32 bytes.
///
/// Each `f32` is stored as 4 bytes, producing `vec.len() * 4` bytes total.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a stored blob back into a float vector.
///
/// The blob must hold exactly `4 * dim` bytes; anything else is a storage
/// fault (a corrupt or foreign row).
pub fn blob_to_vec(blob: &[u8], dim: usize) -> Result<Vec<f32>> {
    if blob.len() != dim * 4 {
        return Err(Error::Storage(format!(
            "vector blob holds {} bytes, expected {} for dim {}",
            blob.len(),
            dim * 4,
            dim
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Accumulates in f64. Returns `0.0` for empty vectors, mismatched lengths,
/// or when either vector has zero magnitude.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob, vec.len()).unwrap();
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_blob_shape_mismatch_rejected() {
        let blob = vec_to_blob(&[1.0, 2.0, 3.0]);
        let err = blob_to_vec(&blob, 4).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine(&a, &b).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine(&a, &b) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_zero_magnitude() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 2.0];
        assert_eq!(cosine(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine(&[1.0, 2.0], &[1.0]), 0.0);
    }
}

//! Offline feature-hashing embedder.
//!
//! Lowercases the text, splits it into alphanumeric tokens, and adds 1.0 to
//! the bucket selected by the first eight bytes of each token's SHA-256
//! digest. The result is L2-normalized, so cosine similarity reduces to the
//! share of overlapping terms. Output depends only on the text and the
//! dimension count, which makes it stable across processes and platforms.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::{RagError, Result};

pub(super) const DEFAULT_DIMS: usize = 384;

pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(RagError::config("embedding.dims must be > 0"));
        }
        Ok(Self { dims })
    }

    /// Synchronous embedding of one text.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(head) % self.dims as u64) as usize;
            v[bucket] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "feature-hash-v1"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let e = HashEmbedder::new(384).unwrap();
        let a = e.embed_text("Life expectancy at birth");
        let b = e.embed_text("Life expectancy at birth");
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let e = HashEmbedder::new(64).unwrap();
        assert_eq!(e.embed_text("Health, wealth!"), e.embed_text("health wealth"));
    }

    #[test]
    fn test_unit_length() {
        let e = HashEmbedder::new(128).unwrap();
        let v = e.embed_text("maternal mortality ratio per 100 000 live births");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let e = HashEmbedder::new(16).unwrap();
        assert!(e.embed_text("  ...  ").iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_shared_terms_rank_higher() {
        let e = HashEmbedder::new(384).unwrap();
        let q = e.embed_text("What is health?");
        let near = e.embed_text("Health is wealth.");
        let far = e.embed_text("WHO defines health broadly.");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_zero_dims_rejected() {
        assert!(HashEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let e = HashEmbedder::new(32).unwrap();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let out = e.embed_batch(&texts).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], e.embed_text("alpha"));
        assert_eq!(out[1], e.embed_text("beta"));
        assert_eq!(e.embed("beta").await.unwrap(), out[1]);
    }
}

//! Embedding backend abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete backends:
//! - **[`HashEmbedder`]**: offline feature-hashing bag-of-words; no model, no network.
//! - **[`OpenAIEmbedder`]**: any OpenAI-compatible `/embeddings` endpoint.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: on-device sentence models via fastembed
//!   (feature `local-embeddings-fastembed`).
//!
//! Also provides vector utilities for the SQLite index:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Backend Selection
//!
//! Use [`create_embedder`] to instantiate the backend named by
//! `embedding.provider`:
//!
//! ```rust
//! # use health_rag::config::EmbeddingConfig;
//! # use health_rag::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "hash"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.dims(), 384);
//! ```
//!
//! # Contract
//!
//! Every backend is deterministic for a fixed model and returns exactly one
//! vector of [`Embedder::dims`] length per input, in input order. A batch
//! that cannot honour that fails with
//! [`RagError::EmbeddingBackend`] listing the affected positions rather than
//! silently dropping items.

mod hashing;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod remote;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

pub use hashing::HashEmbedder;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;
pub use remote::{OllamaEmbedder, OpenAIEmbedder};

/// Maps text to fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, pinned on the collection at ingestion time.
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text (e.g. a query).
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingBackend {
            backend: self.model_name().to_string(),
            message: "empty embedding response".to_string(),
            failed_items: vec![0],
            retryable: false,
        })
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Backend |
/// |-------------|----------|
/// | `"hash"` | [`HashEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
///
/// # Errors
///
/// [`RagError::Configuration`] for unknown providers, missing model or dims,
/// a missing API key, or a local model without the cargo feature.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims.unwrap_or(
            hashing::DEFAULT_DIMS,
        ))?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(RagError::config(
            "local embedding provider requires --features local-embeddings-fastembed",
        )),
        other => Err(RagError::config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Check that a backend returned one vector of `dims` length per input.
pub(crate) fn check_batch(
    backend: &str,
    expected: usize,
    dims: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        let failed_items = (vectors.len().min(expected)..expected).collect();
        return Err(RagError::EmbeddingBackend {
            backend: backend.to_string(),
            message: format!("expected {} vectors, got {}", expected, vectors.len()),
            failed_items,
            retryable: false,
        });
    }

    let wrong: Vec<usize> = vectors
        .iter()
        .enumerate()
        .filter(|(_, v)| v.len() != dims)
        .map(|(i, _)| i)
        .collect();
    if let Some(&first) = wrong.first() {
        return Err(RagError::EmbeddingBackend {
            backend: backend.to_string(),
            message: format!(
                "expected {}-dimensional vectors, got {} at position {}",
                dims,
                vectors[first].len(),
                first
            ),
            failed_items: wrong,
            retryable: false,
        });
    }

    Ok(vectors)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use health_rag::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; higher means nearer.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Parse a JSON array of numbers into a vector.
pub(crate) fn json_to_vec(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

//! HTTP embedding backends: OpenAI-compatible APIs and Ollama.
//!
//! Both send the whole batch in one request, retry transient failures with
//! exponential backoff, and verify that the response holds one vector of
//! the configured dimensionality per input.

use async_trait::async_trait;
use std::time::Duration;

use super::{check_batch, json_to_vec, Embedder};
use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};
use crate::retry::{send_json, RetryPolicy};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::config(format!("failed to build HTTP client: {}", e)))
}

fn require_model_and_dims(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model = config.model.clone().ok_or_else(|| {
        RagError::config(format!(
            "embedding.model required for {} provider",
            config.provider
        ))
    })?;
    let dims = config.dims.filter(|&d| d > 0).ok_or_else(|| {
        RagError::config(format!(
            "embedding.dims required for {} provider",
            config.provider
        ))
    })?;
    Ok((model, dims))
}

// ============ OpenAI-compatible ============

/// Embedding backend for `POST {base_url}/embeddings`.
///
/// Reads its bearer token from the environment variable named by
/// `embedding.api_key_env` when constructed.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = require_model_and_dims(config)?;
        let api_key = config.api_key()?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model,
            dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = send_json(
            self.client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body),
            |message, retryable| RagError::embedding("openai", message, retryable),
        )
        .await?;

        parse_openai_response(&json)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self
            .retry
            .run("openai embeddings", || self.request(texts))
            .await?;
        check_batch("openai", texts.len(), self.dims, vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let invalid = |what: &str| RagError::embedding("openai", format!("invalid response: {}", what), false);

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let vec = item
            .get("embedding")
            .and_then(json_to_vec)
            .ok_or_else(|| invalid("missing embedding"))?;
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding backend for a local Ollama instance (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = require_model_and_dims(config)?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let url = &self.url;
        let json = send_json(
            self.client.post(format!("{}/api/embed", url)).json(&body),
            |message, retryable| {
                RagError::embedding(
                    "ollama",
                    format!("{} (is Ollama running at {}?)", message, url),
                    retryable,
                )
            },
        )
        .await?;

        parse_ollama_response(&json)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self
            .retry
            .run("ollama embeddings", || self.request(texts))
            .await?;
        check_batch("ollama", texts.len(), self.dims, vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::embedding("ollama", "invalid response: missing embeddings array", false)
        })?;

    embeddings
        .iter()
        .map(|e| {
            json_to_vec(e).ok_or_else(|| {
                RagError::embedding("ollama", "invalid response: embedding is not an array", false)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_reorders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let out = parse_openai_response(&json).unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_rejects_malformed() {
        assert!(parse_openai_response(&serde_json::json!({"error": "x"})).is_err());
        let json = serde_json::json!({"data": [{"index": 0}]});
        assert!(!parse_openai_response(&json).unwrap_err().is_retryable());
    }

    #[test]
    fn test_parse_ollama() {
        let json = serde_json::json!({"embeddings": [[0.25, 0.5], [1.0, 0.0]]});
        assert_eq!(
            parse_ollama_response(&json).unwrap(),
            vec![vec![0.25, 0.5], vec![1.0, 0.0]]
        );
        assert!(parse_ollama_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            ..EmbeddingConfig::default()
        };
        let err = OpenAIEmbedder::new(&config).err().unwrap();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: Some("text-embedding-3-small".into()),
            dims: Some(1536),
            api_key_env: "HRAG_TEST_SURELY_UNSET_EMBED_KEY".into(),
            ..EmbeddingConfig::default()
        };
        let err = OpenAIEmbedder::new(&config).err().unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_ollama_unreachable_is_retryable() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            model: Some("nomic-embed-text".into()),
            dims: Some(768),
            base_url: Some("http://127.0.0.1:9".into()),
            max_retries: 0,
            timeout_secs: 2,
            ..EmbeddingConfig::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("is Ollama running"));
    }
}

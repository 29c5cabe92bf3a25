//! On-device sentence embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that embedding runs fully offline. Inference is CPU-bound, so it runs on
//! the blocking pool. The loaded model is kept for the embedder's lifetime.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{check_batch, Embedder};
use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        // Fail early on unknown names rather than at first embed.
        to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            _ => 384,
        });
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(Mutex::new(None)),
        })
    }
}

fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => Err(RagError::config(format!(
            "unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5",
            other
        ))),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let name = self.model_name.clone();
        let batch_size = self.batch_size;
        let inputs = texts.to_vec();

        let vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = model
                .lock()
                .map_err(|_| RagError::embedding("local", "model lock poisoned", false))?;
            if guard.is_none() {
                let options = fastembed::InitOptions::new(to_fastembed_model(&name)?)
                    .with_show_download_progress(true);
                let loaded = fastembed::TextEmbedding::try_new(options).map_err(|e| {
                    RagError::embedding(
                        "local",
                        format!("failed to initialize model {}: {}", name, e),
                        false,
                    )
                })?;
                *guard = Some(loaded);
            }
            match guard.as_mut() {
                Some(m) => m
                    .embed(inputs, Some(batch_size))
                    .map_err(|e| RagError::embedding("local", e.to_string(), false)),
                None => Err(RagError::embedding("local", "model not loaded", false)),
            }
        })
        .await
        .map_err(|e| RagError::embedding("local", format!("embedding task failed: {}", e), false))??;

        check_batch("local", texts.len(), self.dims, vectors)
    }
}

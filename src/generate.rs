//! Answer generation.
//!
//! The [`Generator`] trait is the narrow capability every text-generation
//! backend implements: one prompt in, one raw completion out. Two backends
//! are provided:
//!
//! - [`OpenAICompatibleGenerator`]: `POST {base_url}/chat/completions`, which
//!   covers OpenAI, OpenRouter, and most hosted gateways.
//! - [`OllamaGenerator`]: `POST {url}/api/generate` on a local Ollama.
//!
//! [`AnswerGenerator`] wraps a backend with a per-attempt timeout and an
//! optional bounded retry, and never returns an error: a failed call becomes
//! an [`Answer::Failed`] that renders as `Error: <reason>`.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use crate::retry::{send_json, RetryPolicy};

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model_id: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short backend name used in errors and logs.
    fn name(&self) -> &str;

    /// Return the raw completion for `request.prompt`.
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;
}

/// Outcome of a generation call. Both variants render as user-facing text.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Text(String),
    Failed { reason: String },
}

impl Answer {
    pub fn is_error(&self) -> bool {
        matches!(self, Answer::Failed { .. })
    }

    /// The completion text, or the failure reason.
    pub fn message(&self) -> &str {
        match self {
            Answer::Text(t) => t,
            Answer::Failed { reason } => reason,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Answer::Text(t) => Some(t),
            Answer::Failed { .. } => None,
        }
    }
}

impl From<RagError> for Answer {
    fn from(e: RagError) -> Self {
        Answer::Failed {
            reason: e.to_string(),
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Text(t) => write!(f, "{}", t),
            Answer::Failed { reason } => write!(f, "Error: {}", reason),
        }
    }
}

/// Backend call wrapped with timeout and retry; never raises.
pub struct AnswerGenerator {
    backend: Arc<dyn Generator>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(backend: Arc<dyn Generator>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::none(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Send `prompt` to the backend and capture the outcome.
    pub async fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Answer {
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            model_id: model_id.to_string(),
            temperature,
            max_tokens,
        };

        let result = self
            .retry
            .run("generation", || self.attempt(&request))
            .await;

        match result {
            Ok(text) => Answer::Text(text),
            Err(e) => {
                tracing::error!(
                    backend = self.backend.name(),
                    model = model_id,
                    error = %e,
                    "generation failed"
                );
                Answer::from(e)
            }
        }
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.backend.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(RagError::generation(
                self.backend.name(),
                format!("no response within {:?}", self.timeout),
                true,
            )),
        }
    }
}

/// Build the backend named by `config.provider`, reading its credential.
///
/// # Errors
///
/// [`RagError::Configuration`] for an unknown provider or a missing API key.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| RagError::config(format!("failed to build HTTP client: {}", e)))?;

    match config.provider.as_str() {
        "openai" => {
            let api_key = config.api_key()?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string());
            Ok(Arc::new(OpenAICompatibleGenerator::new(
                client, base_url, api_key,
            )))
        }
        "ollama" => {
            let url = config
                .base_url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
            Ok(Arc::new(OllamaGenerator::new(client, url)))
        }
        other => Err(RagError::config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAICompatibleGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAICompatibleGenerator {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl Generator for OpenAICompatibleGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": request.model_id,
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let json = send_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body),
            |message, retryable| RagError::generation("openai", message, retryable),
        )
        .await?;

        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(RagError::generation("openai", message, false));
    }

    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::generation(
                "openai",
                "invalid response: missing choices[0].message.content",
                false,
            )
        })
}

// ============ Ollama ============

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
}

impl OllamaGenerator {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": request.model_id,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        let url = &self.url;
        let json = send_json(
            self.client.post(format!("{}/api/generate", url)).json(&body),
            |message, retryable| {
                RagError::generation(
                    "ollama",
                    format!("{} (is Ollama running at {}?)", message, url),
                    retryable,
                )
            },
        )
        .await?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                RagError::generation("ollama", "invalid response: missing response", false)
            })
    }
}

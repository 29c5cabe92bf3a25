//! Configuration parsing, environment overrides, and validation.
//!
//! Configuration is read from a TOML file (by default `./config/hrag.toml`).
//! Every section and field has a default, so an empty file, or no file at
//! all when the default path is used, yields a working offline setup: a
//! local SQLite index and the hashing embedder.
//!
//! After parsing, a fixed set of `HRAG_*` environment variables override
//! individual fields, then [`Config::validate`] checks the result.
//!
//! # Example
//!
//! ```toml
//! [db]
//! url = "sqlite://./data/hrag.sqlite"
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 50
//!
//! [retrieval]
//! collection = "healthdata"
//! top_k = 4
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"
//! base_url = "https://openrouter.ai/api/v1"
//! model = "openai/gpt-3.5-turbo"
//! api_key_env = "OPENROUTER_API_KEY"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::prompt::{PromptTemplate, DEFAULT_TEMPLATE};

/// Path consulted when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/hrag.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// `sqlite://path`, a bare file path, or `sqlite::memory:`.
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_db_url() -> String {
    "sqlite://./data/hrag.sqlite".to_string()
}
fn default_acquire_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            top_k: default_top_k(),
        }
    }
}

fn default_collection() -> String {
    "healthdata".to_string()
}
fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// One of `hash`, `openai`, `ollama`, `local`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key (`openai` only).
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            base_url: None,
            api_key_env: default_embedding_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// One of `openai` (any OpenAI-compatible endpoint) or `ollama`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on the assembled prompt, in characters.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_template")]
    pub prompt_template: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            base_url: None,
            api_key_env: default_generation_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_prompt_chars: default_max_prompt_chars(),
            max_retries: 0,
            timeout_secs: default_generation_timeout_secs(),
            prompt_template: default_template(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_model() -> String {
    "openai/gpt-3.5-turbo".to_string()
}
fn default_generation_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    500
}
fn default_max_prompt_chars() -> usize {
    12_000
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

impl GenerationConfig {
    /// Read the generation API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        read_credential(&self.api_key_env, "generation")
    }
}

impl EmbeddingConfig {
    pub fn api_key(&self) -> Result<String> {
        read_credential(&self.api_key_env, "embedding")
    }
}

fn read_credential(var: &str, purpose: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RagError::config(format!(
            "{} API key not set (expected in environment variable {})",
            purpose, var
        ))),
    }
}

/// Load configuration from `path`, or from [`DEFAULT_CONFIG_PATH`] when `None`.
///
/// A missing default file is not an error; defaults apply. A missing file
/// that was asked for explicitly is.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|e| {
                RagError::config(format!("failed to read config file {}: {}", p.display(), e))
            })?;
            Config::from_toml_str(&content)?
        }
        None => load_default_file(&PathBuf::from(DEFAULT_CONFIG_PATH))?,
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Defaults apply only when the file does not exist; any other read error
/// (permissions, a directory in its place) is reported.
fn load_default_file(path: &Path) -> Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(content) => Config::from_toml_str(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(RagError::config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))),
    }
}

impl Config {
    /// Parse TOML without applying overrides or validation.
    pub fn from_toml_str(content: &str) -> Result<Config> {
        toml::from_str(content)
            .map_err(|e| RagError::config(format!("failed to parse config file: {}", e)))
    }

    /// Apply `HRAG_*` overrides supplied by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HRAG_DB_URL") {
            self.db.url = v;
        }
        if let Some(v) = lookup("HRAG_COLLECTION") {
            self.retrieval.collection = v;
        }
        if let Some(v) = lookup("HRAG_EMBEDDING_PROVIDER") {
            self.embedding.provider = v;
        }
        if let Some(v) = lookup("HRAG_EMBEDDING_MODEL") {
            self.embedding.model = Some(v);
        }
        if let Some(v) = lookup("HRAG_GENERATION_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = lookup("HRAG_CHUNK_SIZE") {
            self.chunking.chunk_size = parse_number("HRAG_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("HRAG_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_number("HRAG_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("HRAG_TOP_K") {
            self.retrieval.top_k = parse_number("HRAG_TOP_K", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.db.url.trim().is_empty() {
            return Err(RagError::config("db.url must not be empty"));
        }

        // Validate chunking
        if self.chunking.chunk_size == 0 {
            return Err(RagError::config("chunking.chunk_size must be > 0"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RagError::config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }

        // Validate retrieval
        if self.retrieval.top_k < 1 {
            return Err(RagError::config("retrieval.top_k must be >= 1"));
        }
        if self.retrieval.collection.trim().is_empty() {
            return Err(RagError::config("retrieval.collection must not be empty"));
        }

        // Validate embedding
        match self.embedding.provider.as_str() {
            "hash" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    return Err(RagError::config(format!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    )));
                }
                if self.embedding.dims.is_none() {
                    return Err(RagError::config(format!(
                        "embedding.dims must be specified when provider is '{}'",
                        self.embedding.provider
                    )));
                }
            }
            other => {
                return Err(RagError::config(format!(
                    "unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
                    other
                )))
            }
        }
        if self.embedding.dims == Some(0) {
            return Err(RagError::config("embedding.dims must be > 0"));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::config("embedding.batch_size must be > 0"));
        }

        // Validate generation
        match self.generation.provider.as_str() {
            "openai" | "ollama" => {}
            other => {
                return Err(RagError::config(format!(
                    "unknown generation provider: '{}'. Must be openai or ollama.",
                    other
                )))
            }
        }
        check_generation_params(self.generation.temperature, self.generation.max_tokens)?;
        if self.generation.max_prompt_chars == 0 {
            return Err(RagError::config("generation.max_prompt_chars must be > 0"));
        }
        PromptTemplate::parse(&self.generation.prompt_template)?;

        Ok(())
    }
}

/// Range checks shared by the config file and per-request overrides.
pub fn check_generation_params(temperature: f32, max_tokens: u32) -> Result<()> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(RagError::config(format!(
            "temperature must be in [0.0, 2.0], got {}",
            temperature
        )));
    }
    if max_tokens == 0 {
        return Err(RagError::config("max_tokens must be > 0"));
    }
    Ok(())
}

fn parse_number(var: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| RagError::config(format!("{} must be a non-negative integer, got '{}'", var, value)))
}

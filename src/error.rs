//! Error taxonomy for the retrieval pipeline.
//!
//! Every fallible library operation returns [`Result<T>`]. The variants map
//! one-to-one onto the failure categories the pipeline distinguishes:
//!
//! | Variant | Scope | Retryable |
//! |---------|-------|-----------|
//! | [`RagError::Configuration`] | whole session | never |
//! | [`RagError::EmbeddingBackend`] | one request / batch | when the backend says so |
//! | [`RagError::IndexUnavailable`] | one request | always |
//! | [`RagError::CollectionNotFound`] | one request | never |
//! | [`RagError::ContextTooLarge`] | one request | never |
//! | [`RagError::GenerationBackend`] | one request | when the backend says so |
//! | [`RagError::Document`] | one ingestion run | never |

use thiserror::Error;

/// Errors produced by ingestion, retrieval, prompt assembly, and generation.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or invalid configuration: credentials, connection strings,
    /// templates, or an embedder that does not match the indexed collection.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding model could not produce vectors.
    ///
    /// `failed_items` lists the batch positions that did not receive a
    /// vector; it is empty when the whole call failed before any item was
    /// processed.
    #[error("embedding backend error ({backend}): {message}")]
    EmbeddingBackend {
        backend: String,
        message: String,
        failed_items: Vec<usize>,
        retryable: bool,
    },

    /// The vector index backing store could not be reached or failed a query.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// `search` was called on a collection that was never created.
    #[error("collection '{0}' not found (has ingestion been run?)")]
    CollectionNotFound(String),

    /// The question and template alone exceed the generator's input limit.
    #[error("context too large: prompt needs {required} characters but the limit is {limit}")]
    ContextTooLarge { required: usize, limit: usize },

    /// The text-generation backend failed to return a completion.
    #[error("generation backend error ({backend}): {message}")]
    GenerationBackend {
        backend: String,
        message: String,
        retryable: bool,
    },

    /// A source document could not be read or decoded during ingestion.
    #[error("failed to load document {path}: {message}")]
    Document { path: String, message: String },
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Whether a bounded retry may succeed where this attempt failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::EmbeddingBackend { retryable, .. } => *retryable,
            RagError::GenerationBackend { retryable, .. } => *retryable,
            RagError::IndexUnavailable(_) => true,
            RagError::Configuration(_)
            | RagError::CollectionNotFound(_)
            | RagError::ContextTooLarge { .. }
            | RagError::Document { .. } => false,
        }
    }

    /// Whether this error must abort the whole session rather than a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RagError::Configuration(_))
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        RagError::Configuration(message.into())
    }

    pub(crate) fn embedding(backend: &str, message: impl Into<String>, retryable: bool) -> Self {
        RagError::EmbeddingBackend {
            backend: backend.to_string(),
            message: message.into(),
            failed_items: Vec::new(),
            retryable,
        }
    }

    pub(crate) fn generation(backend: &str, message: impl Into<String>, retryable: bool) -> Self {
        RagError::GenerationBackend {
            backend: backend.to_string(),
            message: message.into(),
            retryable,
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(e: sqlx::Error) -> Self {
        RagError::IndexUnavailable(e.to_string())
    }
}

//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, chunks, and retrieval hits that flow
//! from ingestion through the vector index to prompt assembly.

use serde::Serialize;

/// A source document (or one page of a source document) to be indexed.
///
/// Immutable once created by the loader.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Originating file name.
    pub source: String,
    /// 1-based page number for paginated sources (PDF).
    pub page: Option<u32>,
    pub text: String,
}

/// A contiguous, bounded-length slice of a [`Document`]'s text.
///
/// `start` and `end` are character offsets into the document text and
/// `text` is exactly that slice, so consecutive chunks can be rejoined by
/// dropping the configured overlap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub source: String,
    pub page: Option<u32>,
    pub chunk_index: i64,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Chunk {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }

    /// Human-readable origin, e.g. `health_data.pdf p.12`.
    pub fn citation(&self) -> String {
        match self.page {
            Some(page) => format!("{} p.{}", self.source, page),
            None => self.source.clone(),
        }
    }
}

/// One entry of a retrieval result: a chunk and its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Summary of a collection stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    /// Embedding model the collection was populated with, once pinned.
    pub embedding_model: Option<String>,
    /// Vector dimensionality, fixed by the first pin or insert.
    pub dims: Option<usize>,
    pub entry_count: u64,
    pub created_at: i64,
}

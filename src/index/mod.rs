//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the storage operations the ingestion
//! and query pipelines need, with two backends:
//!
//! - [`SqliteIndex`]: persistent, one row per (chunk, vector) pair.
//! - [`InMemoryIndex`]: process-local, for tests and embedding the pipeline
//!   in other programs.
//!
//! # Ranking
//!
//! Similarity is cosine (higher is nearer) for every collection. `search`
//! returns at most `k` hits sorted by non-increasing score; equal scores
//! keep insertion order, so earlier-inserted entries win ties.
//!
//! # Collections
//!
//! A collection moves from does-not-exist → created-empty (via
//! [`ensure_collection`](VectorIndex::ensure_collection)) → populated. Searching
//! an empty collection yields no hits; searching a name that was never
//! created is [`RagError::CollectionNotFound`]. The vector dimensionality is
//! fixed by the first pin or insert; any later vector of a different length
//! is a [`RagError::Configuration`] error.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::models::{Chunk, CollectionInfo, SearchHit};

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

/// Distance metric recorded on every collection.
pub const METRIC: &str = "cosine";

/// Abstract vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_collection`](VectorIndex::ensure_collection) | Create a collection if absent |
/// | [`insert`](VectorIndex::insert) | Append one (chunk, vector) pair |
/// | [`insert_batch`](VectorIndex::insert_batch) | Append many pairs |
/// | [`search`](VectorIndex::search) | Top-k cosine search |
/// | [`drop_collection`](VectorIndex::drop_collection) | Delete a collection and its entries |
/// | [`collection_info`](VectorIndex::collection_info) | Entry count and pinned embedder |
/// | [`list_collections`](VectorIndex::list_collections) | All collections |
/// | [`pin_embedding`](VectorIndex::pin_embedding) | Record the embedder a collection uses |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the named collection if absent; otherwise a no-op.
    async fn ensure_collection(&self, name: &str) -> Result<()>;

    /// Append one pair. Duplicate chunk ids accumulate.
    async fn insert(&self, collection: &str, chunk: &Chunk, vector: &[f32]) -> Result<()>;

    /// Append many pairs in order.
    async fn insert_batch(&self, collection: &str, entries: &[(Chunk, Vec<f32>)]) -> Result<()> {
        for (chunk, vector) in entries {
            self.insert(collection, chunk, vector).await?;
        }
        Ok(())
    }

    /// The `k` entries most similar to `query`, best first.
    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Remove a collection and all its entries. Returns whether it existed.
    async fn drop_collection(&self, name: &str) -> Result<bool>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Record which embedder populates `name`. Pinning the same model again
    /// is a no-op; a different model or dimensionality is rejected.
    async fn pin_embedding(&self, name: &str, model: &str, dims: usize) -> Result<()>;
}

/// Reject a pin that disagrees with what the collection already records.
pub(crate) fn check_pin(info: &CollectionInfo, model: &str, dims: usize) -> Result<()> {
    if let Some(existing) = &info.embedding_model {
        if existing != model {
            return Err(RagError::config(format!(
                "collection '{}' was built with embedding model '{}' but '{}' is configured; \
                 drop and re-ingest to switch models",
                info.name, existing, model
            )));
        }
    }
    check_dims(&info.name, info.dims, dims)
}

/// Reject a vector whose length differs from the collection's.
pub(crate) fn check_dims(collection: &str, expected: Option<usize>, got: usize) -> Result<()> {
    if got == 0 {
        return Err(RagError::config(format!(
            "empty vector for collection '{}'",
            collection
        )));
    }
    match expected {
        Some(d) if d != got => Err(RagError::config(format!(
            "collection '{}' holds {}-dimensional vectors but got {} dimensions",
            collection, d, got
        ))),
        _ => Ok(()),
    }
}

/// Order scored entries by score descending, then insertion sequence
/// ascending, and keep the first `k`.
pub(crate) fn rank(mut scored: Vec<(i64, SearchHit)>, k: usize) -> Vec<SearchHit> {
    scored.sort_by(|(seq_a, a), (seq_b, b)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| seq_a.cmp(seq_b))
    });
    scored.truncate(k);
    scored.into_iter().map(|(_, hit)| hit).collect()
}

/// Cosine score used by both backends; NaN components rank last.
pub(crate) fn score(query: &[f32], vector: &[f32]) -> f32 {
    let s = crate::embedding::cosine_similarity(query, vector);
    if s.is_nan() {
        f32::NEG_INFINITY
    } else {
        s
    }
}

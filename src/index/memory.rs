//! In-memory [`VectorIndex`] implementation.
//!
//! Collections live in a `HashMap` behind a tokio `RwLock`, so concurrent
//! searches share a read lock and ingestion takes the write lock. Search is
//! brute-force cosine similarity over every entry in the collection.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_dims, check_pin, rank, score, VectorIndex};
use crate::error::{RagError, Result};
use crate::models::{Chunk, CollectionInfo, SearchHit};

struct StoredCollection {
    embedding_model: Option<String>,
    dims: Option<usize>,
    created_at: i64,
    /// Insertion order is the tie-break order.
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl StoredCollection {
    fn info(&self, name: &str) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            embedding_model: self.embedding_model.clone(),
            dims: self.dims,
            entry_count: self.entries.len() as u64,
            created_at: self.created_at,
        }
    }

    fn push(&mut self, name: &str, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        check_dims(name, self.dims, vector.len())?;
        self.dims.get_or_insert(vector.len());
        self.entries.push((chunk.clone(), vector.to_vec()));
        Ok(())
    }
}

/// Process-local vector index.
#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| StoredCollection {
                embedding_model: None,
                dims: None,
                created_at: chrono::Utc::now().timestamp(),
                entries: Vec::new(),
            });
        Ok(())
    }

    async fn insert(&self, collection: &str, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        stored.push(collection, chunk, vector)
    }

    async fn insert_batch(&self, collection: &str, entries: &[(Chunk, Vec<f32>)]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        // Validate the whole batch first so a bad vector leaves nothing behind.
        let mut dims = stored.dims;
        for (_, vector) in entries {
            check_dims(collection, dims, vector.len())?;
            dims.get_or_insert(vector.len());
        }
        for (chunk, vector) in entries {
            stored.push(collection, chunk, vector)?;
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        if stored.dims.is_some() {
            check_dims(collection, stored.dims, query.len())?;
        }
        if k == 0 || stored.entries.is_empty() {
            return Ok(Vec::new());
        }

        let scored = stored
            .entries
            .iter()
            .enumerate()
            .map(|(seq, (chunk, vector))| {
                (
                    seq as i64,
                    SearchHit {
                        chunk: chunk.clone(),
                        score: score(query, vector),
                    },
                )
            })
            .collect();

        Ok(rank(scored, k))
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.write().await.remove(name).is_some())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let collections = self.collections.read().await;
        collections
            .get(name)
            .map(|c| c.info(name))
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read().await;
        let mut infos: Vec<CollectionInfo> =
            collections.iter().map(|(name, c)| c.info(name)).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn pin_embedding(&self, name: &str, model: &str, dims: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(name)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;
        check_pin(&stored.info(name), model, dims)?;
        stored.embedding_model = Some(model.to_string());
        stored.dims = Some(dims);
        Ok(())
    }
}

//! Query-time retrieval.
//!
//! [`Retriever`] composes the embedder and the vector index: it embeds the
//! query text, searches the configured collection, and returns the ranked
//! chunks. Before every search it checks that the embedder matches the one
//! pinned on the collection at ingestion time. A mismatch (different model
//! or dimensionality) is a [`RagError::Configuration`] error, since vectors
//! from two models are not comparable.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{Chunk, SearchHit};

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    k: usize,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
        k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            collection: collection.into(),
            k,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Default number of chunks returned.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Check the configured embedder against the collection's pinned one.
    ///
    /// # Errors
    ///
    /// [`RagError::CollectionNotFound`] when ingestion never ran, or
    /// [`RagError::Configuration`] on a model or dimension mismatch.
    pub async fn verify(&self) -> Result<()> {
        let info = self.index.collection_info(&self.collection).await?;
        if let Some(pinned) = &info.embedding_model {
            if pinned != self.embedder.model_name() {
                return Err(RagError::config(format!(
                    "collection '{}' was ingested with embedding model '{}' but the query \
                     embedder is '{}'",
                    self.collection,
                    pinned,
                    self.embedder.model_name()
                )));
            }
        }
        if let Some(dims) = info.dims {
            if dims != self.embedder.dims() {
                return Err(RagError::config(format!(
                    "collection '{}' holds {}-dimensional vectors but the query embedder \
                     produces {}",
                    self.collection,
                    dims,
                    self.embedder.dims()
                )));
            }
        }
        Ok(())
    }

    /// Top-`k` chunks for `query` with their similarity scores, best first.
    pub async fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.verify().await?;
        let vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&self.collection, &vector, k).await?;
        tracing::debug!(
            collection = %self.collection,
            k,
            hits = hits.len(),
            "retrieved chunks"
        );
        Ok(hits)
    }

    /// Top-`k` chunks for `query`, best first, without scores.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::InMemoryIndex;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: text.into(),
            document_id: "doc".into(),
            source: "test.txt".into(),
            page: None,
            chunk_index: 0,
            start: 0,
            end: text.chars().count(),
            text: text.into(),
            hash: String::new(),
        }
    }

    async fn populated(embedder: &HashEmbedder) -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new());
        index.ensure_collection("health").await.unwrap();
        index
            .pin_embedding("health", embedder.model_name(), embedder.dims())
            .await
            .unwrap();
        for text in ["Health is wealth.", "WHO defines health broadly."] {
            index
                .insert("health", &chunk(text), &embedder.embed_text(text))
                .await
                .unwrap();
        }
        index
    }

    #[tokio::test]
    async fn test_retrieve_returns_best_match() {
        let embedder = HashEmbedder::new(384).unwrap();
        let index = populated(&embedder).await;
        let retriever = Retriever::new(index, Arc::new(embedder), "health", 4);

        let chunks = retriever.retrieve("What is health?", 1).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Health is wealth.");
    }

    #[tokio::test]
    async fn test_k_larger_than_collection() {
        let embedder = HashEmbedder::new(384).unwrap();
        let index = populated(&embedder).await;
        let retriever = Retriever::new(index, Arc::new(embedder), "health", 4);

        let hits = retriever.retrieve_scored("health", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let ingest_embedder = HashEmbedder::new(384).unwrap();
        let index = populated(&ingest_embedder).await;
        let retriever = Retriever::new(
            index,
            Arc::new(HashEmbedder::new(128).unwrap()),
            "health",
            4,
        );

        let err = retriever.retrieve("health", 1).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let retriever = Retriever::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(HashEmbedder::new(8).unwrap()),
            "never",
            4,
        );
        assert!(matches!(
            retriever.retrieve("q", 1).await.unwrap_err(),
            RagError::CollectionNotFound(_)
        ));
    }
}

//! End-to-end scenarios through the library API, backed by SQLite on disk.

use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;

use health_rag::ask::{AskOptions, GenerationDefaults, QueryPipeline};
use health_rag::config::{ChunkingConfig, DbConfig};
use health_rag::embedding::{Embedder, HashEmbedder};
use health_rag::error::{RagError, Result};
use health_rag::generate::{AnswerGenerator, GenerationRequest, Generator};
use health_rag::index::{SqliteIndex, VectorIndex};
use health_rag::ingest::{ingest_path, IngestOptions};
use health_rag::models::Chunk;
use health_rag::progress::NoProgress;
use health_rag::prompt::{assemble, PromptAssembler, DEFAULT_TEMPLATE};
use health_rag::retrieve::Retriever;

const CORPUS: &str = "Health is wealth.\n\nWHO defines health broadly.";

struct Setup {
    tmp: TempDir,
    index: Arc<SqliteIndex>,
    embedder: Arc<HashEmbedder>,
}

async fn ingested(collection: &str) -> Setup {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("health.txt");
    std::fs::write(&source, CORPUS).unwrap();

    let db = DbConfig {
        url: format!("sqlite://{}", tmp.path().join("hrag.sqlite").display()),
        ..DbConfig::default()
    };
    let index = Arc::new(SqliteIndex::connect(&db).await.unwrap());
    let embedder = Arc::new(HashEmbedder::new(384).unwrap());

    let report = ingest_path(
        index.as_ref(),
        embedder.as_ref(),
        &source,
        &ChunkingConfig {
            chunk_size: 40,
            chunk_overlap: 0,
        },
        &IngestOptions {
            collection: collection.to_string(),
            drop_first: false,
            batch_size: 16,
        },
        &NoProgress,
    )
    .await
    .unwrap();
    assert_eq!(report.inserted, 2);

    Setup {
        tmp,
        index,
        embedder,
    }
}

struct Echo;

#[async_trait]
impl Generator for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        Ok(request.prompt.clone())
    }
}

struct Down;

#[async_trait]
impl Generator for Down {
    fn name(&self) -> &str {
        "down"
    }

    async fn complete(&self, _request: &GenerationRequest) -> Result<String> {
        Err(RagError::GenerationBackend {
            backend: "down".into(),
            message: "503 service unavailable".into(),
            retryable: true,
        })
    }
}

fn pipeline(setup: &Setup, generator: Arc<dyn Generator>) -> QueryPipeline {
    let retriever = Retriever::new(
        setup.index.clone(),
        setup.embedder.clone(),
        "healthdata",
        4,
    );
    QueryPipeline::new(
        retriever,
        PromptAssembler::new(DEFAULT_TEMPLATE, 12_000).unwrap(),
        AnswerGenerator::new(generator),
        GenerationDefaults {
            model: "test".into(),
            temperature: 0.1,
            max_tokens: 500,
        },
    )
}

#[tokio::test]
async fn test_two_paragraphs_retrieve_best_match() {
    let setup = ingested("healthdata").await;
    let retriever = Retriever::new(
        setup.index.clone(),
        setup.embedder.clone(),
        "healthdata",
        1,
    );

    let chunks = retriever.retrieve("What is health?", 1).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text.trim(), "Health is wealth.");
    assert_eq!(chunks[0].source, "health.txt");
}

#[tokio::test]
async fn test_k_clamped_to_collection_size() {
    let setup = ingested("healthdata").await;
    let query = setup.embedder.embed("health").await.unwrap();

    let hits = setup.index.search("healthdata", &query, 50).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn test_empty_versus_missing_collection() {
    let setup = ingested("healthdata").await;
    let query = setup.embedder.embed("health").await.unwrap();

    setup.index.ensure_collection("empty").await.unwrap();
    assert!(setup.index.search("empty", &query, 4).await.unwrap().is_empty());

    let err = setup.index.search("never", &query, 4).await.unwrap_err();
    assert!(matches!(err, RagError::CollectionNotFound(name) if name == "never"));
}

#[tokio::test]
async fn test_index_survives_reconnect() {
    let setup = ingested("healthdata").await;
    let url = format!(
        "sqlite://{}",
        setup.tmp.path().join("hrag.sqlite").display()
    );
    setup.index.pool().close().await;

    let reopened = SqliteIndex::connect(&DbConfig {
        url,
        ..DbConfig::default()
    })
    .await
    .unwrap();
    let info = reopened.collection_info("healthdata").await.unwrap();
    assert_eq!(info.entry_count, 2);
    assert_eq!(info.embedding_model.as_deref(), Some("feature-hash-v1"));
    assert_eq!(info.dims, Some(384));
}

#[tokio::test]
async fn test_answer_carries_grounded_prompt() {
    let setup = ingested("healthdata").await;
    let outcome = pipeline(&setup, Arc::new(Echo))
        .answer("What is health?", &AskOptions::default())
        .await;

    let prompt = outcome.answer.text().unwrap();
    assert!(prompt.contains("Context: Health is wealth.\n\nWHO defines health broadly."));
    assert!(prompt.contains("Question: What is health?\n\n"));
    assert_eq!(outcome.sources.len(), 2);
    assert!(!outcome.fatal);
}

#[tokio::test]
async fn test_backend_failure_is_error_answer() {
    let setup = ingested("healthdata").await;
    let p = pipeline(&setup, Arc::new(Down));

    let first = p.answer("What is health?", &AskOptions::default()).await;
    assert!(first.answer.is_error());
    assert!(first.answer.message().contains("503 service unavailable"));
    assert!(!first.fatal);

    // The index is untouched by the failure.
    let info = setup.index.collection_info("healthdata").await.unwrap();
    assert_eq!(info.entry_count, 2);
}

#[tokio::test]
async fn test_query_embedder_mismatch_is_fatal() {
    let setup = ingested("healthdata").await;
    let retriever = Retriever::new(
        setup.index.clone(),
        Arc::new(HashEmbedder::new(64).unwrap()),
        "healthdata",
        4,
    );
    let p = QueryPipeline::new(
        retriever,
        PromptAssembler::new(DEFAULT_TEMPLATE, 12_000).unwrap(),
        AnswerGenerator::new(Arc::new(Echo)),
        GenerationDefaults {
            model: "test".into(),
            temperature: 0.1,
            max_tokens: 500,
        },
    );

    let outcome = p.answer("What is health?", &AskOptions::default()).await;
    assert!(outcome.answer.is_error());
    assert!(outcome.fatal);
}

#[test]
fn test_prompt_format_contract() {
    let chunks: Vec<Chunk> = ["A", "B"]
        .iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            id: format!("c{}", i),
            document_id: "doc".into(),
            source: "inline".into(),
            page: None,
            chunk_index: i as i64,
            start: i,
            end: i + 1,
            text: text.to_string(),
            hash: String::new(),
        })
        .collect();
    let prompt = assemble(&chunks, "Q?", "Context: {context}\nQuestion: {question}").unwrap();
    assert_eq!(prompt, "Context: A\n\nB\nQuestion: Q?");
}

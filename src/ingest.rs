//! Ingestion pipeline orchestration.
//!
//! Coordinates the offline flow: load → chunk → embed → store. Runs once per
//! source document and populates one collection of the vector index.
//!
//! Re-running ingestion without dropping the collection appends a second
//! copy of every chunk. Pass `drop_first` (CLI: `--drop`) to replace the
//! collection instead.

use anyhow::bail;
use std::path::Path;

use crate::chunk::chunk_document;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};
use crate::index::{SqliteIndex, VectorIndex};
use crate::loader::load_documents;
use crate::models::{Chunk, Document};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, ProgressMode};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub collection: String,
    /// Drop the collection before inserting.
    pub drop_first: bool,
    /// Chunks per embedding call.
    pub batch_size: usize,
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub inserted: usize,
    /// Chunks whose embedding failed; they are not in the index.
    pub failed: usize,
    pub dropped: bool,
}

/// Load `path` and ingest it into `options.collection`.
pub async fn ingest_path(
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    path: &Path,
    chunking: &ChunkingConfig,
    options: &IngestOptions,
    reporter: &dyn IngestProgressReporter,
) -> Result<IngestReport> {
    let source = path.display().to_string();
    reporter.report(IngestProgressEvent::Loading {
        source: source.clone(),
    });
    let docs = load_documents(path)?;
    ingest_documents(index, embedder, &source, &docs, chunking, options, reporter).await
}

/// Chunk, embed, and store already-loaded documents.
///
/// The collection is created if absent and pinned to `embedder`; a
/// collection built with a different embedder is rejected before anything
/// is written. An embedding batch that still fails after the backend's own
/// retries is counted in [`IngestReport::failed`] and skipped. Index errors
/// and configuration errors abort the run.
///
/// With `drop_first`, every chunk is embedded before the old collection is
/// dropped. If any batch fails, nothing is dropped or written.
pub async fn ingest_documents(
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    source: &str,
    docs: &[Document],
    chunking: &ChunkingConfig,
    options: &IngestOptions,
    reporter: &dyn IngestProgressReporter,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        documents: docs.len(),
        ..IngestReport::default()
    };
    let collection = options.collection.as_str();
    let batch_size = options.batch_size.max(1);

    if !options.drop_first {
        prepare_collection(index, embedder, collection).await?;
    }

    let chunks: Vec<Chunk> = docs
        .iter()
        .flat_map(|doc| chunk_document(doc, chunking.chunk_size, chunking.chunk_overlap))
        .collect();
    report.chunks = chunks.len();

    tracing::info!(
        collection,
        documents = docs.len(),
        chunks = chunks.len(),
        model = embedder.model_name(),
        "ingesting"
    );

    let total = chunks.len() as u64;
    let mut done = 0u64;
    let mut staged: Vec<(Chunk, Vec<f32>)> = Vec::new();
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        match embedder.embed_batch(&texts).await {
            Ok(vectors) => {
                let entries: Vec<(Chunk, Vec<f32>)> =
                    batch.iter().cloned().zip(vectors).collect();
                if options.drop_first {
                    staged.extend(entries);
                } else {
                    index.insert_batch(collection, &entries).await?;
                    report.inserted += entries.len();
                }
            }
            Err(e @ RagError::Configuration(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(
                    collection,
                    first_chunk = batch[0].chunk_index,
                    batch = batch.len(),
                    error = %e,
                    "embedding batch failed; skipping"
                );
                report.failed += batch.len();
            }
        }
        done += batch.len() as u64;
        reporter.report(IngestProgressEvent::Embedding {
            source: source.to_string(),
            n: done,
            total,
        });
    }

    if options.drop_first {
        if report.failed > 0 {
            tracing::warn!(
                collection,
                failed = report.failed,
                "embedding incomplete; collection left unchanged"
            );
            return Ok(report);
        }
        report.dropped = index.drop_collection(collection).await?;
        prepare_collection(index, embedder, collection).await?;
        for entries in staged.chunks(batch_size) {
            index.insert_batch(collection, entries).await?;
            report.inserted += entries.len();
        }
    }

    tracing::info!(
        collection,
        inserted = report.inserted,
        failed = report.failed,
        "ingestion finished"
    );
    Ok(report)
}

async fn prepare_collection(
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    collection: &str,
) -> Result<()> {
    index.ensure_collection(collection).await?;
    index
        .pin_embedding(collection, embedder.model_name(), embedder.dims())
        .await
}

/// Run `hrag ingest`.
pub async fn run_ingest(
    config: &Config,
    path: &Path,
    collection: Option<String>,
    drop_first: bool,
    progress: ProgressMode,
) -> anyhow::Result<()> {
    let index = SqliteIndex::connect(&config.db).await?;
    let embedder = create_embedder(&config.embedding)?;
    let options = IngestOptions {
        collection: collection.unwrap_or_else(|| config.retrieval.collection.clone()),
        drop_first,
        batch_size: config.embedding.batch_size,
    };

    let reporter = progress.reporter();
    let report = ingest_path(
        &index,
        embedder.as_ref(),
        path,
        &config.chunking,
        &options,
        reporter.as_ref(),
    )
    .await?;

    println!("ingest {}", path.display());
    println!("  collection: {}", options.collection);
    if report.dropped {
        println!("  dropped previous entries");
    }
    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    println!("  inserted: {}", report.inserted);
    if report.failed > 0 {
        println!("  failed: {}", report.failed);
        if options.drop_first {
            bail!(
                "{} of {} chunks could not be embedded; collection '{}' left unchanged",
                report.failed,
                report.chunks,
                options.collection
            );
        }
        bail!(
            "{} of {} chunks could not be embedded",
            report.failed,
            report.chunks
        );
    }
    println!("ok");
    Ok(())
}

/// Run `hrag drop`.
pub async fn run_drop(config: &Config, collection: &str) -> anyhow::Result<()> {
    let index = SqliteIndex::connect(&config.db).await?;
    if index.drop_collection(collection).await? {
        println!("Dropped collection '{}'.", collection);
    } else {
        println!("Collection '{}' does not exist.", collection);
    }
    Ok(())
}

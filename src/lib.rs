//! # Health RAG
//!
//! A retrieval-augmented question-answering pipeline over a health
//! statistics corpus.
//!
//! A source document is split into overlapping chunks, embedded, and stored
//! in a vector index. At query time the question is embedded with the same
//! model, the nearest chunks are assembled into a bounded prompt, and a
//! language model produces an answer grounded in that context.
//!
//! ## Architecture
//!
//! ```text
//!            ingestion (offline)                      query (per request)
//! ┌──────────┐   ┌─────────┐   ┌──────────┐     ┌───────────┐   ┌──────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedder │──┐  │ Retriever │──▶│  Prompt  │
//! │ txt/pdf  │   └─────────┘   └──────────┘  │  └─────▲─────┘   │ Assembler│
//! └──────────┘                               ▼        │         └────┬─────┘
//!                                      ┌──────────────┴┐             ▼
//!                                      │ Vector Index  │       ┌──────────┐
//!                                      │ SQLite/memory │       │ Answer   │
//!                                      └───────────────┘       │ Generator│
//!                                                              └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hrag init                               # create database
//! hrag ingest ./data/health_data.pdf      # chunk, embed, store
//! hrag search "life expectancy"           # retrieval only
//! hrag ask "What is the global life expectancy?" --sources
//! hrag chat                               # one question per line
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`loader`] | Text and PDF loading |
//! | [`chunk`] | Separator-hierarchy chunking |
//! | [`embedding`] | Embedding backends |
//! | [`index`] | Vector index trait, SQLite and in-memory backends |
//! | [`retrieve`] | Query embedding + search with embedder pinning |
//! | [`prompt`] | Prompt template and bounded context assembly |
//! | [`generate`] | Generation backends and error-carrying answers |
//! | [`ask`] | Query pipeline and the `ask`/`chat` commands |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retry`] | Backoff policy and HTTP helpers |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod ask;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod retrieve;
pub mod retry;
pub mod search;
pub mod stats;

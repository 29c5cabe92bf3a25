//! Retrieval-only search (`hrag search`).
//!
//! Runs the query half of the pipeline without generation: embeds the query,
//! ranks the collection, and prints the hits with their cosine scores. Handy
//! for checking what context a question would get before paying for a model
//! call.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::SqliteIndex;
use crate::retrieve::Retriever;

const EXCERPT_CHARS: usize = 240;

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    collection: Option<String>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let index = SqliteIndex::connect(&config.db).await?;
    let embedder = create_embedder(&config.embedding)?;
    let collection = collection.unwrap_or_else(|| config.retrieval.collection.clone());
    let k = k.unwrap_or(config.retrieval.top_k).max(1);

    let retriever = Retriever::new(Arc::new(index), embedder, collection, k);
    let hits = retriever.retrieve_scored(query, k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, hit.score, hit.chunk.citation());
        println!("    chunk: {}", hit.chunk.chunk_index);
        println!("    excerpt: \"{}\"", excerpt(&hit.chunk.text, EXCERPT_CHARS));
        println!("    id: {}", hit.chunk.id);
        println!();
    }

    Ok(())
}

/// Collapse whitespace and cut to `max_chars`, marking the cut with `...`.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_flattens_whitespace() {
        assert_eq!(
            excerpt("Health is\n\nwealth.\n", 100),
            "Health is wealth."
        );
    }

    #[test]
    fn test_excerpt_truncates_on_chars() {
        assert_eq!(excerpt("ééééé ééééé", 6), "ééééé...");
        assert_eq!(excerpt("abc", 3), "abc");
    }
}

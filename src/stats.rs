//! Index statistics.
//!
//! Provides a quick summary of what's indexed: collections, entry counts,
//! and the embedder each collection is pinned to. Used by `hrag stats` to
//! confirm an ingestion run landed where the query path will look.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::index::{SqliteIndex, VectorIndex};

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::connect(&config.db).await?;
    let collections = index.list_collections().await?;
    let total_entries: u64 = collections.iter().map(|c| c.entry_count).sum();

    println!("Health RAG Index Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.url);
    if let Some(path) = db::database_path(&config.db) {
        let db_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        println!("  Size:        {}", format_bytes(db_size));
    }
    println!();
    println!("  Collections: {}", collections.len());
    println!("  Entries:     {}", total_entries);

    if !collections.is_empty() {
        println!();
        println!(
            "  {:<20} {:>8} {:<24} {:>6}   {}",
            "COLLECTION", "ENTRIES", "EMBEDDING MODEL", "DIMS", "CREATED"
        );
        println!("  {}", "-".repeat(76));

        for c in &collections {
            let marker = if c.name == config.retrieval.collection {
                " *"
            } else {
                ""
            };
            println!(
                "  {:<20} {:>8} {:<24} {:>6}   {}{}",
                c.name,
                c.entry_count,
                c.embedding_model.as_deref().unwrap_or("-"),
                c.dims.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                format_ts_relative(c.created_at),
                marker
            );
        }
    } else {
        println!();
        println!("  Nothing ingested yet. Run `hrag ingest <path>`.");
    }

    println!();

    index.pool().close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}

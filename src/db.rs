//! SQLite connection pool setup.
//!
//! `db.url` may be a `sqlite://` URL, a bare file path, or `sqlite::memory:`.
//! File databases are created on first use (including parent directories)
//! and run in WAL mode. In-memory databases are pinned to a single
//! connection that is never recycled, since every new connection would
//! otherwise see a fresh, empty database.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config::DbConfig;
use crate::error::{RagError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(config: &DbConfig) -> Result<SqlitePool> {
    let url = config.url.trim();
    let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);

    if is_memory_url(url) {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;
        return Ok(pool);
    }

    let options = if url.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(url)?
    } else {
        SqliteConnectOptions::new().filename(url)
    };

    // Ensure parent directory exists
    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::IndexUnavailable(format!(
                    "cannot create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let options = options
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(acquire_timeout)
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn is_memory_url(url: &str) -> bool {
    url == "sqlite::memory:" || url == ":memory:" || url == "sqlite://:memory:"
}

/// File path of the database, or `None` for in-memory databases.
pub fn database_path(config: &DbConfig) -> Option<&Path> {
    let url = config.url.trim();
    if is_memory_url(url) {
        return None;
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    Some(Path::new(path))
}

//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Each entry is one row in `entries` holding the chunk text, its metadata,
//! and the vector as a little-endian f32 BLOB. Search loads a collection's
//! vectors and scores them in Rust, which is fine for single-corpus sizes
//! (tens of thousands of chunks).

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{check_dims, check_pin, rank, score, VectorIndex, METRIC};
use crate::config::DbConfig;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{Chunk, CollectionInfo, SearchHit};

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Wrap an existing pool. The schema must already exist.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `config.url` and create the schema if needed.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query(
            r#"
            SELECT c.name, c.embedding_model, c.dims, c.created_at,
                   (SELECT COUNT(*) FROM entries e WHERE e.collection = c.name) AS entry_count
            FROM collections c
            WHERE c.name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_info(&r)))
    }

    async fn require_info(&self, name: &str) -> Result<CollectionInfo> {
        self.fetch_info(name)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }
}

fn row_to_info(row: &SqliteRow) -> CollectionInfo {
    let dims: Option<i64> = row.get("dims");
    let entry_count: i64 = row.get("entry_count");
    CollectionInfo {
        name: row.get("name"),
        embedding_model: row.get("embedding_model"),
        dims: dims.map(|d| d as usize),
        entry_count: entry_count as u64,
        created_at: row.get("created_at"),
    }
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let page: Option<i64> = row.get("page");
    let start: i64 = row.get("start_offset");
    let end: i64 = row.get("end_offset");
    Chunk {
        id: row.get("chunk_id"),
        document_id: row.get("document_id"),
        source: row.get("source"),
        page: page.map(|p| p as u32),
        chunk_index: row.get("chunk_index"),
        start: start as usize,
        end: end as usize,
        text: row.get("text"),
        hash: row.get("hash"),
    }
}

async fn insert_row<'e, E>(
    executor: E,
    collection: &str,
    chunk: &Chunk,
    vector: &[f32],
    now: i64,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO entries (collection, chunk_id, document_id, source, page, chunk_index,
                             start_offset, end_offset, text, hash, embedding, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(collection)
    .bind(&chunk.id)
    .bind(&chunk.document_id)
    .bind(&chunk.source)
    .bind(chunk.page.map(|p| p as i64))
    .bind(chunk.chunk_index)
    .bind(chunk.start as i64)
    .bind(chunk.end as i64)
    .bind(&chunk.text)
    .bind(&chunk.hash)
    .bind(vec_to_blob(vector))
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO collections (name, metric, created_at) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(METRIC)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert(&self, collection: &str, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        self.insert_batch(collection, &[(chunk.clone(), vector.to_vec())])
            .await
    }

    async fn insert_batch(&self, collection: &str, entries: &[(Chunk, Vec<f32>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let info = self.require_info(collection).await?;
        let mut dims = info.dims;
        for (_, vector) in entries {
            check_dims(collection, dims, vector.len())?;
            dims.get_or_insert(vector.len());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        if info.dims.is_none() {
            sqlx::query("UPDATE collections SET dims = ? WHERE name = ? AND dims IS NULL")
                .bind(dims.map(|d| d as i64))
                .bind(collection)
                .execute(&mut *tx)
                .await?;
        }

        for (chunk, vector) in entries {
            insert_row(&mut *tx, collection, chunk, vector, now).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let info = self.require_info(collection).await?;
        if info.dims.is_some() {
            check_dims(collection, info.dims, query.len())?;
        }
        if k == 0 || info.entry_count == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT seq, chunk_id, document_id, source, page, chunk_index,
                   start_offset, end_offset, text, hash, embedding
            FROM entries
            WHERE collection = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let seq: i64 = row.get("seq");
                (
                    seq,
                    SearchHit {
                        chunk: row_to_chunk(row),
                        score: score(query, &blob_to_vec(&blob)),
                    },
                )
            })
            .collect();

        Ok(rank(scored, k))
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entries WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        self.require_info(name).await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT c.name, c.embedding_model, c.dims, c.created_at,
                   (SELECT COUNT(*) FROM entries e WHERE e.collection = c.name) AS entry_count
            FROM collections c
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_info).collect())
    }

    async fn pin_embedding(&self, name: &str, model: &str, dims: usize) -> Result<()> {
        let info = self.require_info(name).await?;
        check_pin(&info, model, dims)?;

        sqlx::query("UPDATE collections SET embedding_model = ?, dims = ? WHERE name = ?")
            .bind(model)
            .bind(dims as i64)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_index() -> SqliteIndex {
        SqliteIndex::connect(&DbConfig {
            url: "sqlite::memory:".into(),
            ..DbConfig::default()
        })
        .await
        .unwrap()
    }

    fn chunk(text: &str, page: Option<u32>) -> Chunk {
        Chunk {
            id: format!("id-{}", text),
            document_id: "doc".into(),
            source: "health_data.pdf".into(),
            page,
            chunk_index: 3,
            start: 10,
            end: 10 + text.chars().count(),
            text: text.into(),
            hash: "abc".into(),
        }
    }

    #[tokio::test]
    async fn test_roundtrips_chunk_metadata() {
        let index = memory_index().await;
        index.ensure_collection("c").await.unwrap();
        let original = chunk("Life expectancy", Some(7));
        index.insert("c", &original, &[0.6, 0.8]).await.unwrap();

        let hits = index.search("c", &[0.6, 0.8], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk, original);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ensure_collection_idempotent() {
        let index = memory_index().await;
        index.ensure_collection("c").await.unwrap();
        index.insert("c", &chunk("a", None), &[1.0]).await.unwrap();
        index.ensure_collection("c").await.unwrap();
        assert_eq!(index.collection_info("c").await.unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let index = memory_index().await;
        assert!(matches!(
            index.search("nope", &[1.0], 1).await.unwrap_err(),
            RagError::CollectionNotFound(_)
        ));
        assert!(matches!(
            index.insert("nope", &chunk("a", None), &[1.0]).await.unwrap_err(),
            RagError::CollectionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_first_insert_fixes_dims() {
        let index = memory_index().await;
        index.ensure_collection("c").await.unwrap();
        assert_eq!(index.collection_info("c").await.unwrap().dims, None);
        index.insert("c", &chunk("a", None), &[1.0, 0.0, 0.0]).await.unwrap();
        assert_eq!(index.collection_info("c").await.unwrap().dims, Some(3));
        assert!(index
            .insert("c", &chunk("b", None), &[1.0, 0.0])
            .await
            .unwrap_err()
            .is_fatal());
    }

    #[tokio::test]
    async fn test_drop_removes_entries() {
        let index = memory_index().await;
        index.ensure_collection("c").await.unwrap();
        index.insert("c", &chunk("a", None), &[1.0]).await.unwrap();
        assert!(index.drop_collection("c").await.unwrap());

        let leftover: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(index.pool())
            .await
            .unwrap();
        assert_eq!(leftover, 0);
        assert!(index.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pin_rejects_other_model() {
        let index = memory_index().await;
        index.ensure_collection("c").await.unwrap();
        index.pin_embedding("c", "feature-hash-v1", 384).await.unwrap();
        let err = index
            .pin_embedding("c", "text-embedding-3-small", 1536)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("feature-hash-v1"));
    }
}

//! SQLite-backed vector store.
//!
//! In-process index using SQLite for metadata and brute-force cosine
//! similarity for search. Embeddings are stored as little-endian f32 blobs.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{VectorMatch, VectorRecord, VectorStore};
use crate::config::AppPaths;
use crate::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.vector_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_owner ON vectors(owner_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, ApiError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let total = records.len();

        for record in &records {
            let blob = Self::serialize_embedding(&record.embedding);
            let metadata_str =
                serde_json::to_string(&record.metadata).unwrap_or_else(|_| "{}".to_string());

            sqlx::query(
                "INSERT OR REPLACE INTO vectors (id, owner_id, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&record.id)
            .bind(&record.owner_id)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(total)
    }

    async fn query(
        &self,
        embedding: &[f32],
        owner_id: &str,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, metadata, embedding FROM vectors WHERE owner_id = ?1",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<VectorMatch> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(embedding, &stored);

                let metadata_str: String = row.get("metadata");
                let metadata =
                    serde_json::from_str::<Value>(&metadata_str).unwrap_or(Value::Null);

                Some(VectorMatch {
                    id: row.get("id"),
                    score,
                    metadata,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k.max(1));

        Ok(scored)
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM vectors WHERE owner_id = ?1")
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, owner_id: Option<&str>) -> Result<usize, ApiError> {
        let count: i64 = if let Some(owner_id) = owner_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE owner_id = ?1")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> SqliteVectorStore {
        let tmp = std::env::temp_dir().join(format!(
            "studypal-vector-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        SqliteVectorStore::with_path(tmp).await.unwrap()
    }

    fn record(id: &str, owner: &str, embedding: Vec<f32>, file: &str, index: u64) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            owner_id: owner.to_string(),
            embedding,
            metadata: json!({
                "chunk_text": format!("text of {id}"),
                "file_name": file,
                "chunk_index": index,
            }),
        }
    }

    #[tokio::test]
    async fn upsert_and_query_ranks_by_similarity() {
        let store = test_store().await;

        store
            .upsert(vec![
                record("c1", "u1", vec![1.0, 0.0, 0.0], "a.txt", 0),
                record("c2", "u1", vec![0.0, 1.0, 0.0], "a.txt", 1),
                record("c3", "u1", vec![0.9, 0.1, 0.0], "b.txt", 0),
            ])
            .await
            .unwrap();

        let matches = store.query(&[1.0, 0.0, 0.0], "u1", 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "c1");
        assert_eq!(matches[1].id, "c3");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn query_is_scoped_to_owner() {
        let store = test_store().await;

        store
            .upsert(vec![
                record("c1", "u1", vec![1.0, 0.0], "a.txt", 0),
                record("c2", "u2", vec![1.0, 0.0], "b.txt", 0),
            ])
            .await
            .unwrap();

        let matches = store.query(&[1.0, 0.0], "u2", 10).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "c2");

        let matches = store.query(&[1.0, 0.0], "u3", 10).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn delete_owner_and_count() {
        let store = test_store().await;

        store
            .upsert(vec![
                record("c1", "u1", vec![1.0], "a.txt", 0),
                record("c2", "u1", vec![1.0], "a.txt", 1),
                record("c3", "u2", vec![1.0], "b.txt", 0),
            ])
            .await
            .unwrap();

        assert_eq!(store.count(Some("u1")).await.unwrap(), 2);
        assert_eq!(store.delete_owner("u1").await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 1);
    }
}

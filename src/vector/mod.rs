//! Vector index abstraction.
//!
//! Stores `(embedding, metadata)` pairs namespaced by owner and answers
//! cosine-similarity queries restricted to one owner. The primary
//! implementation is `SqliteVectorStore`.

pub mod sqlite;

pub use sqlite::SqliteVectorStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ApiError;

/// A vector plus its metadata, ready for upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Unique record identifier.
    pub id: String,
    /// Owner whose documents this record belongs to.
    pub owner_id: String,
    pub embedding: Vec<f32>,
    /// Chunk provenance (`chunk_text`, `file_name`, `chunk_index`, ...).
    pub metadata: Value,
}

/// One similarity match.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine similarity, higher is better.
    pub score: f32,
    pub metadata: Value,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a batch of records.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, ApiError>;

    /// Return the `top_k` nearest neighbors for `embedding`, restricted to
    /// records owned by `owner_id`.
    async fn query(
        &self,
        embedding: &[f32],
        owner_id: &str,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, ApiError>;

    /// Delete all records for an owner. Returns the number removed.
    async fn delete_owner(&self, owner_id: &str) -> Result<usize, ApiError>;

    /// Total record count, optionally restricted to one owner.
    async fn count(&self, owner_id: Option<&str>) -> Result<usize, ApiError>;
}

//! Query/document embedding.
//!
//! The retriever consumes embeddings through the [`Embedder`] trait; the
//! concrete client calls an OpenAI-compatible `/v1/embeddings` endpoint.

pub mod http;

pub use http::HttpEmbedder;

use async_trait::async_trait;

use crate::errors::ApiError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError>;

    /// embed a batch of texts, one vector per input in order
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

//! Context retrieval: embed the question, query the vector index scoped
//! to the requesting owner, map matches to passages with provenance.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::vector::VectorStore;

use super::types::ContextChunk;

/// Outcome of a retrieval attempt.
///
/// `Unavailable` covers embedding and index failures; both it and an empty
/// `Retrieved` collapse to the same empty-result response downstream, but
/// the distinction stays visible to callers and logs.
#[derive(Debug)]
pub enum Retrieval {
    Retrieved(Vec<ContextChunk>),
    Unavailable,
}

impl Retrieval {
    pub fn chunks(self) -> Vec<ContextChunk> {
        match self {
            Retrieval::Retrieved(chunks) => chunks,
            Retrieval::Unavailable => Vec::new(),
        }
    }
}

pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorStore>) -> Self {
        Self { embedder, vectors }
    }

    /// Retrieve the `top_k` most similar passages owned by `owner_id`.
    ///
    /// Exactly one embedding call per request. Errors are recoverable:
    /// they log and yield [`Retrieval::Unavailable`] instead of failing
    /// the pipeline.
    pub async fn retrieve(&self, query_text: &str, owner_id: &str, top_k: usize) -> Retrieval {
        let embedding = match self.embedder.embed(query_text).await {
            Ok(embedding) => embedding,
            Err(err) => {
                tracing::warn!("query embedding failed: {}", err);
                return Retrieval::Unavailable;
            }
        };

        let matches = match self.vectors.query(&embedding, owner_id, top_k).await {
            Ok(matches) => matches,
            Err(err) => {
                tracing::warn!("vector query failed: {}", err);
                return Retrieval::Unavailable;
            }
        };

        let chunks: Vec<ContextChunk> = matches
            .into_iter()
            .map(|m| ContextChunk {
                text: m.metadata["chunk_text"].as_str().unwrap_or("").to_string(),
                source_file_name: m.metadata["file_name"].as_str().unwrap_or("").to_string(),
                chunk_index: m.metadata["chunk_index"].as_i64().unwrap_or(0),
                relevance_score: m.score,
            })
            .collect();

        tracing::info!(owner = owner_id, count = chunks.len(), "retrieved context");
        Retrieval::Retrieved(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::errors::ApiError;
    use crate::vector::{VectorMatch, VectorRecord};

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ApiError> {
            Ok(self.0.clone())
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ApiError> {
            Err(ApiError::ServiceUnavailable)
        }

        async fn embed_many(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Err(ApiError::ServiceUnavailable)
        }
    }

    struct FixedVectors(Vec<VectorMatch>);

    #[async_trait]
    impl VectorStore for FixedVectors {
        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<usize, ApiError> {
            Ok(0)
        }

        async fn query(
            &self,
            _embedding: &[f32],
            _owner_id: &str,
            _top_k: usize,
        ) -> Result<Vec<VectorMatch>, ApiError> {
            Ok(self.0.clone())
        }

        async fn delete_owner(&self, _owner_id: &str) -> Result<usize, ApiError> {
            Ok(0)
        }

        async fn count(&self, _owner_id: Option<&str>) -> Result<usize, ApiError> {
            Ok(self.0.len())
        }
    }

    struct FailingVectors;

    #[async_trait]
    impl VectorStore for FailingVectors {
        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<usize, ApiError> {
            Err(ApiError::ServiceUnavailable)
        }

        async fn query(
            &self,
            _embedding: &[f32],
            _owner_id: &str,
            _top_k: usize,
        ) -> Result<Vec<VectorMatch>, ApiError> {
            Err(ApiError::ServiceUnavailable)
        }

        async fn delete_owner(&self, _owner_id: &str) -> Result<usize, ApiError> {
            Err(ApiError::ServiceUnavailable)
        }

        async fn count(&self, _owner_id: Option<&str>) -> Result<usize, ApiError> {
            Err(ApiError::ServiceUnavailable)
        }
    }

    #[tokio::test]
    async fn maps_matches_with_metadata_defaults() {
        let matches = vec![
            VectorMatch {
                id: "c1".to_string(),
                score: 0.9,
                metadata: json!({
                    "chunk_text": "Paris is the capital of France.",
                    "file_name": "geo.txt",
                    "chunk_index": 4,
                }),
            },
            VectorMatch {
                id: "c2".to_string(),
                score: 0.4,
                metadata: json!({}),
            },
        ];

        let retriever = ContextRetriever::new(
            Arc::new(FixedEmbedder(vec![1.0])),
            Arc::new(FixedVectors(matches)),
        );

        let chunks = retriever.retrieve("q", "u1", 3).await.chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_file_name, "geo.txt");
        assert_eq!(chunks[0].chunk_index, 4);
        assert_eq!(chunks[1].text, "");
        assert_eq!(chunks[1].source_file_name, "");
        assert_eq!(chunks[1].chunk_index, 0);
    }

    #[tokio::test]
    async fn embedding_failure_is_unavailable() {
        let retriever = ContextRetriever::new(
            Arc::new(FailingEmbedder),
            Arc::new(FixedVectors(Vec::new())),
        );
        assert!(matches!(
            retriever.retrieve("q", "u1", 3).await,
            Retrieval::Unavailable
        ));
    }

    #[tokio::test]
    async fn index_failure_is_unavailable() {
        let retriever = ContextRetriever::new(
            Arc::new(FixedEmbedder(vec![1.0])),
            Arc::new(FailingVectors),
        );
        assert!(matches!(
            retriever.retrieve("q", "u1", 3).await,
            Retrieval::Unavailable
        ));
    }
}

//! Pipeline orchestration.
//!
//! Sequences memory loading, context retrieval, answer composition and the
//! two best-effort side effects (turn persistence, analytics). Every
//! failure path yields a well-formed [`AnswerResult`]; nothing propagates
//! past [`RagPipeline::ask`].

use std::sync::Arc;

use serde_json::{json, Value};

use crate::analytics::AnalyticsSink;
use crate::embedding::Embedder;
use crate::llm::Generator;
use crate::memory::{MemoryStore, NewTurn};
use crate::vector::VectorStore;

use super::composer::{AnswerComposer, ComposeOutcome};
use super::memory_loader::MemoryLoader;
use super::retriever::ContextRetriever;
use super::types::{AnswerResult, AskQuery, ContextChunk, Reference};

pub struct RagPipeline {
    retriever: ContextRetriever,
    memory_loader: MemoryLoader,
    composer: AnswerComposer,
    memory: Arc<dyn MemoryStore>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl RagPipeline {
    /// All collaborators are injected once at construction; the pipeline
    /// holds no global state.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        memory: Arc<dyn MemoryStore>,
        analytics: Arc<dyn AnalyticsSink>,
        context_window: usize,
    ) -> Self {
        Self {
            retriever: ContextRetriever::new(embedder, vectors),
            memory_loader: MemoryLoader::new(memory.clone(), context_window),
            composer: AnswerComposer::new(generator),
            memory,
            analytics,
        }
    }

    /// Answer one question. Always returns a result; degradation and
    /// failure are encoded in the answer text and empty reference list.
    pub async fn ask(&self, query: &AskQuery) -> AnswerResult {
        // Memory and retrieval have no data dependency on each other.
        let (loaded, retrieval) = tokio::join!(
            self.memory_loader.load(&query.owner_id, query.use_memory),
            self.retriever
                .retrieve(&query.text, &query.owner_id, query.top_k),
        );

        let chunks = retrieval.chunks();
        if chunks.is_empty() {
            // Empty context is a first-class terminal outcome, not an error.
            let result = AnswerResult::no_context();
            self.persist_turn(query, &result.answer_text, json!([])).await;
            return result;
        }

        let used_memory = !loaded.turns.is_empty();
        let outcome = self
            .composer
            .compose(
                &query.text,
                &chunks,
                &loaded.turns,
                query.max_answer_tokens,
                query.temperature,
            )
            .await;

        let answer = match outcome {
            ComposeOutcome::Answer(answer) => answer,
            ComposeOutcome::GeneratorFailed(description) => {
                let diagnostic = format!(
                    "I encountered an error while generating the answer: {}",
                    description
                );
                self.persist_turn(query, &diagnostic, json!([])).await;
                return AnswerResult::diagnostic(diagnostic, used_memory);
            }
        };

        let references: Vec<Reference> = chunks.iter().map(Reference::from_chunk).collect();
        let sources = serde_json::to_value(&references).unwrap_or_else(|_| json!([]));

        self.persist_turn(query, &answer, sources).await;
        self.track(query, &chunks).await;

        AnswerResult {
            answer_text: answer,
            references,
            used_memory,
        }
    }

    /// Best-effort persistence; failure is logged and swallowed.
    async fn persist_turn(&self, query: &AskQuery, answer: &str, sources: Value) {
        let turn = NewTurn {
            owner_id: query.owner_id.clone(),
            question: query.text.clone(),
            answer: answer.to_string(),
            sources,
        };

        if let Err(err) = self.memory.save_turn(turn).await {
            tracing::warn!("failed to persist conversation turn: {}", err);
        }
    }

    /// Best-effort analytics; failure is logged and swallowed.
    async fn track(&self, query: &AskQuery, chunks: &[ContextChunk]) {
        let mut documents: Vec<String> = Vec::new();
        for chunk in chunks {
            if chunk.source_file_name.is_empty() {
                continue;
            }
            if !documents.iter().any(|d| *d == chunk.source_file_name) {
                documents.push(chunk.source_file_name.clone());
            }
        }

        let topics = chunk_topics(chunks);

        if let Err(err) = self
            .analytics
            .track_question(&query.owner_id, &query.text, &documents, &topics)
            .await
        {
            tracing::warn!("failed to track question: {}", err);
        }
    }
}

/// Topics from the top two chunks. The indexer does not populate topic
/// metadata yet, so this resolves to "General" whenever context exists.
fn chunk_topics(chunks: &[ContextChunk]) -> Vec<String> {
    let mut topics: Vec<String> = chunks
        .iter()
        .take(2)
        .map(|_| "General".to_string())
        .collect();
    topics.dedup();
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::analytics::NoopAnalytics;
    use crate::errors::ApiError;
    use crate::llm::GenerationRequest;
    use crate::memory::SqliteMemoryStore;
    use crate::rag::types::NO_CONTEXT_ANSWER;
    use crate::vector::{SqliteVectorStore, VectorRecord};

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

    /// Echoes the user prompt so tests can assert on what reached the
    /// generator; deterministic, counts calls, optionally fails.
    struct EchoGenerator {
        calls: AtomicUsize,
        fail: bool,
    }

    impl EchoGenerator {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Generator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn generate(&self, request: GenerationRequest) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ApiError::Internal("boom from generator".to_string()));
            }
            Ok(request.messages[1].content.clone())
        }
    }

    async fn temp_vectors() -> Arc<SqliteVectorStore> {
        let tmp = std::env::temp_dir().join(format!(
            "studypal-pipeline-vec-{}.db",
            Uuid::new_v4()
        ));
        Arc::new(SqliteVectorStore::with_path(tmp).await.unwrap())
    }

    async fn temp_memory() -> Arc<SqliteMemoryStore> {
        let tmp = std::env::temp_dir().join(format!(
            "studypal-pipeline-mem-{}.db",
            Uuid::new_v4()
        ));
        Arc::new(SqliteMemoryStore::with_path(tmp, 50).await.unwrap())
    }

    fn geo_record(id: &str, owner: &str, embedding: Vec<f32>, text: &str, file: &str, index: u64) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            owner_id: owner.to_string(),
            embedding,
            metadata: serde_json::json!({
                "chunk_text": text,
                "file_name": file,
                "chunk_index": index,
            }),
        }
    }

    fn query(owner: &str, text: &str, use_memory: bool) -> AskQuery {
        AskQuery {
            text: text.to_string(),
            owner_id: owner.to_string(),
            top_k: 3,
            max_answer_tokens: 512,
            temperature: 0.0,
            use_memory,
        }
    }

    struct Harness {
        pipeline: RagPipeline,
        generator: Arc<EchoGenerator>,
        memory: Arc<SqliteMemoryStore>,
        vectors: Arc<SqliteVectorStore>,
    }

    async fn harness(generator: EchoGenerator) -> Harness {
        let vectors = temp_vectors().await;
        let memory = temp_memory().await;
        let generator = Arc::new(generator);

        let pipeline = RagPipeline::new(
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            vectors.clone(),
            generator.clone(),
            memory.clone(),
            Arc::new(NoopAnalytics),
            3,
        );

        Harness {
            pipeline,
            generator,
            memory,
            vectors,
        }
    }

    #[tokio::test]
    async fn empty_index_returns_fallback_without_generator_call() {
        let h = harness(EchoGenerator::new()).await;

        let result = h.pipeline.ask(&query("u2", "anything?", true)).await;
        assert_eq!(result.answer_text, NO_CONTEXT_ANSWER);
        assert!(result.references.is_empty());
        assert!(!result.used_memory);
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);

        // The fallback turn is still persisted, best-effort.
        let turns = h.memory.get_all_turns("u2", 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].answer, NO_CONTEXT_ANSWER);
    }

    #[tokio::test]
    async fn retrieval_unavailable_collapses_to_fallback() {
        let vectors = temp_vectors().await;
        let memory = temp_memory().await;
        let generator = Arc::new(EchoGenerator::new());

        let pipeline = RagPipeline::new(
            Arc::new(FailingEmbedder),
            vectors,
            generator.clone(),
            memory,
            Arc::new(NoopAnalytics),
            3,
        );

        let result = pipeline.ask(&query("u1", "q", false)).await;
        assert_eq!(result.answer_text, NO_CONTEXT_ANSWER);
        assert!(result.references.is_empty());
        assert!(!result.used_memory);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn answers_from_indexed_document() {
        let h = harness(EchoGenerator::new()).await;
        h.vectors
            .upsert(vec![geo_record(
                "c0",
                "u1",
                vec![1.0, 0.0],
                "Paris is the capital of France.",
                "geo.txt",
                0,
            )])
            .await
            .unwrap();

        let result = h
            .pipeline
            .ask(&query("u1", "What is the capital of France?", false))
            .await;

        assert!(result.answer_text.contains("Paris"));
        assert_eq!(result.references.len(), 1);
        assert_eq!(result.references[0].source_file_name, "geo.txt");
        assert_eq!(result.references[0].chunk_index, 0);
        assert!(result.references[0].relevance_score >= 0.9);
        assert!(!result.used_memory);
    }

    #[tokio::test]
    async fn references_preserve_rank_and_rounding() {
        let h = harness(EchoGenerator::new()).await;
        h.vectors
            .upsert(vec![
                geo_record("c0", "u1", vec![1.0, 0.0], &"a".repeat(250), "first.txt", 0),
                geo_record("c1", "u1", vec![0.8, 0.6], "middle", "second.txt", 1),
                geo_record("c2", "u1", vec![0.0, 1.0], "far", "third.txt", 2),
            ])
            .await
            .unwrap();

        let result = h.pipeline.ask(&query("u1", "q", false)).await;

        let files: Vec<&str> = result
            .references
            .iter()
            .map(|r| r.source_file_name.as_str())
            .collect();
        assert_eq!(files, vec!["first.txt", "second.txt", "third.txt"]);

        for reference in &result.references {
            let scaled = reference.relevance_score * 1000.0;
            assert!(
                (scaled - scaled.round()).abs() < 1e-3,
                "score not rounded: {}",
                reference.relevance_score
            );
            assert!(reference.excerpt.chars().count() <= 203);
        }
        assert!(result.references[0].excerpt.ends_with("..."));
        assert!(result.references[0].relevance_score > result.references[1].relevance_score);
    }

    #[tokio::test]
    async fn memory_is_gated_by_caller_flag() {
        let h = harness(EchoGenerator::new()).await;
        h.vectors
            .upsert(vec![geo_record(
                "c0",
                "u1",
                vec![1.0, 0.0],
                "context text",
                "doc.txt",
                0,
            )])
            .await
            .unwrap();

        // Seed history so memory would have something to say.
        h.pipeline.ask(&query("u1", "first question", false)).await;

        let opted_out = h.pipeline.ask(&query("u1", "second question", false)).await;
        assert!(!opted_out.used_memory);
        assert!(!opted_out.answer_text.contains("Previous conversation:"));

        let opted_in = h.pipeline.ask(&query("u1", "third question", true)).await;
        assert!(opted_in.used_memory);
        assert!(opted_in.answer_text.contains("Previous conversation:"));
        assert!(opted_in.answer_text.contains("User: first question"));
    }

    #[tokio::test]
    async fn identical_queries_are_idempotent_but_persist_twice() {
        let h = harness(EchoGenerator::new()).await;
        h.vectors
            .upsert(vec![geo_record(
                "c0",
                "u1",
                vec![1.0, 0.0],
                "stable context",
                "doc.txt",
                0,
            )])
            .await
            .unwrap();

        let ask = query("u1", "repeatable?", false);
        let first = h.pipeline.ask(&ask).await;
        let second = h.pipeline.ask(&ask).await;

        assert_eq!(first.answer_text, second.answer_text);
        assert_eq!(first.references, second.references);

        let turns = h.memory.get_all_turns("u1", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_ne!(turns[0].id, turns[1].id);
    }

    #[tokio::test]
    async fn generator_failure_yields_diagnostic_result() {
        let h = harness(EchoGenerator::failing()).await;
        h.vectors
            .upsert(vec![geo_record(
                "c0",
                "u1",
                vec![1.0, 0.0],
                "some context",
                "doc.txt",
                0,
            )])
            .await
            .unwrap();

        let result = h.pipeline.ask(&query("u1", "q", false)).await;
        assert!(result
            .answer_text
            .contains("I encountered an error while generating the answer"));
        assert!(result.answer_text.contains("boom from generator"));
        assert!(result.references.is_empty());
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persisted_sources_match_returned_references() {
        let h = harness(EchoGenerator::new()).await;
        h.vectors
            .upsert(vec![geo_record(
                "c0",
                "u1",
                vec![1.0, 0.0],
                "cited text",
                "cited.txt",
                7,
            )])
            .await
            .unwrap();

        let result = h.pipeline.ask(&query("u1", "q", false)).await;
        assert_eq!(result.references.len(), 1);

        let turns = h.memory.get_all_turns("u1", 10).await.unwrap();
        assert_eq!(turns[0].sources[0]["source_file_name"].as_str(), Some("cited.txt"));
        assert_eq!(turns[0].sources[0]["chunk_index"].as_i64(), Some(7));
    }

    #[test]
    fn topics_default_to_general_placeholder() {
        let chunks = vec![
            ContextChunk {
                text: "a".to_string(),
                source_file_name: "a.txt".to_string(),
                chunk_index: 0,
                relevance_score: 1.0,
            },
            ContextChunk {
                text: "b".to_string(),
                source_file_name: "b.txt".to_string(),
                chunk_index: 1,
                relevance_score: 0.5,
            },
            ContextChunk {
                text: "c".to_string(),
                source_file_name: "c.txt".to_string(),
                chunk_index: 2,
                relevance_score: 0.1,
            },
        ];
        assert_eq!(chunk_topics(&chunks), vec!["General"]);
        assert!(chunk_topics(&[]).is_empty());
    }
}

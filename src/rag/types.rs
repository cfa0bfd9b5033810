//! Request and response types for the answering pipeline.

use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

/// Fixed answer returned when retrieval yields nothing usable.
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in your documents to answer this question.";

/// Reference excerpts are capped at this many characters before the
/// ellipsis.
pub const REFERENCE_EXCERPT_CHARS: usize = 200;

/// One answering request. Created per request, never persisted.
#[derive(Debug, Clone)]
pub struct AskQuery {
    pub text: String,
    pub owner_id: String,
    pub top_k: usize,
    pub max_answer_tokens: u32,
    pub temperature: f32,
    pub use_memory: bool,
}

impl AskQuery {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.text.trim().is_empty() {
            return Err(ApiError::BadRequest("query must not be empty".to_string()));
        }
        if self.owner_id.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "owner_id must not be empty".to_string(),
            ));
        }
        if !(1..=10).contains(&self.top_k) {
            return Err(ApiError::BadRequest(
                "top_k must be between 1 and 10".to_string(),
            ));
        }
        if !(50..=1024).contains(&self.max_answer_tokens) {
            return Err(ApiError::BadRequest(
                "max_answer_tokens must be between 50 and 1024".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ApiError::BadRequest(
                "temperature must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A retrieved passage with provenance, scoped to one request.
#[derive(Debug, Clone)]
pub struct ContextChunk {
    pub text: String,
    pub source_file_name: String,
    pub chunk_index: i64,
    pub relevance_score: f32,
}

/// A source citation in the final answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub source_file_name: String,
    pub chunk_index: i64,
    pub relevance_score: f32,
    pub excerpt: String,
}

impl Reference {
    pub fn from_chunk(chunk: &ContextChunk) -> Self {
        Reference {
            source_file_name: chunk.source_file_name.clone(),
            chunk_index: chunk.chunk_index,
            relevance_score: round3(chunk.relevance_score),
            excerpt: truncate_chars(&chunk.text, REFERENCE_EXCERPT_CHARS),
        }
    }
}

/// The pipeline's terminal result; always well-formed, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer_text: String,
    pub references: Vec<Reference>,
    pub used_memory: bool,
}

impl AnswerResult {
    pub fn no_context() -> Self {
        AnswerResult {
            answer_text: NO_CONTEXT_ANSWER.to_string(),
            references: Vec::new(),
            used_memory: false,
        }
    }

    pub fn diagnostic(message: String, used_memory: bool) -> Self {
        AnswerResult {
            answer_text: message,
            references: Vec::new(),
            used_memory,
        }
    }
}

pub(crate) fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// Truncate on a character boundary, appending an ellipsis when anything
/// was cut.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

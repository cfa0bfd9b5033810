//! Answer composition: prompt assembly and the single generator call.

use std::sync::Arc;

use crate::llm::{ChatMessage, GenerationRequest, Generator};
use crate::memory::ConversationTurn;

use super::types::{truncate_chars, ContextChunk, NO_CONTEXT_ANSWER};

/// Prior answers are cut to this many characters in the memory block.
pub const MEMORY_EXCERPT_CHARS: usize = 150;

/// Nucleus sampling is pinned; only temperature is caller-tunable.
const TOP_P: f32 = 0.95;

const SYSTEM_PROMPT: &str = "You are a helpful study assistant. Answer questions using only the \
provided context from the user's documents. If the context does not contain enough information \
to answer, say so clearly instead of guessing. Prefer citing the sources you used.";

/// Outcome of one composition attempt.
///
/// `GeneratorFailed` carries the error description; the composer never
/// raises past this boundary.
#[derive(Debug)]
pub enum ComposeOutcome {
    Answer(String),
    GeneratorFailed(String),
}

pub struct AnswerComposer {
    generator: Arc<dyn Generator>,
}

impl AnswerComposer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Compose an answer from retrieved chunks and optional memory.
    ///
    /// Empty `chunks` short-circuit to the fixed insufficient-information
    /// answer without a generator call.
    pub async fn compose(
        &self,
        question: &str,
        chunks: &[ContextChunk],
        recent_turns: &[ConversationTurn],
        max_answer_tokens: u32,
        temperature: f32,
    ) -> ComposeOutcome {
        if chunks.is_empty() {
            return ComposeOutcome::Answer(NO_CONTEXT_ANSWER.to_string());
        }

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(question, chunks, recent_turns)),
        ];
        let request = GenerationRequest::new(messages).with_sampling(
            max_answer_tokens,
            temperature,
            TOP_P,
        );

        match self.generator.generate(request).await {
            Ok(answer) => ComposeOutcome::Answer(answer.trim().to_string()),
            Err(err) => {
                tracing::error!("answer generation failed: {}", err);
                ComposeOutcome::GeneratorFailed(err.to_string())
            }
        }
    }
}

/// Blocks in fixed order: optional memory, context in rank order, then the
/// literal question.
fn build_user_prompt(
    question: &str,
    chunks: &[ContextChunk],
    recent_turns: &[ConversationTurn],
) -> String {
    let mut prompt = String::new();

    if let Some(memory_block) = render_memory_block(recent_turns) {
        prompt.push_str(&memory_block);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Context:\n");
    prompt.push_str(&render_context_block(chunks));
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question);
    prompt.push_str("\n\nProvide a clear, concise answer based on the context above.");
    prompt
}

fn render_memory_block(recent_turns: &[ConversationTurn]) -> Option<String> {
    if recent_turns.is_empty() {
        return None;
    }

    let mut block = String::from("Previous conversation:");
    for turn in recent_turns {
        block.push_str("\nUser: ");
        block.push_str(&turn.question);
        block.push_str("\nAssistant: ");
        block.push_str(&truncate_chars(&turn.answer, MEMORY_EXCERPT_CHARS));
    }
    Some(block)
}

fn render_context_block(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "[Source: {} - Chunk {}]\n{}",
                chunk.source_file_name, chunk.chunk_index, chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

//! Hosted LLM generation.
//!
//! The pipeline only sees the [`Generator`] trait; the concrete client
//! speaks the OpenAI-compatible chat completions protocol.

pub mod openai_compat;
pub mod provider;
pub mod types;

pub use openai_compat::OpenAiCompatGenerator;
pub use provider::Generator;
pub use types::{ChatMessage, GenerationRequest};

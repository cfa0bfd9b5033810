//! Retrieval-augmented answering pipeline.
//!
//! Turns `(question, owner, tunables)` into `(answer, ranked citations,
//! memory flag)` by composing semantic retrieval, conversational memory
//! and hosted LLM generation, degrading gracefully when any dependency
//! fails.

pub mod composer;
pub mod memory_loader;
pub mod pipeline;
pub mod retriever;
pub mod types;

pub use composer::{AnswerComposer, ComposeOutcome};
pub use memory_loader::{LoadedMemory, MemoryLoader};
pub use pipeline::RagPipeline;
pub use retriever::{ContextRetriever, Retrieval};
pub use types::{AnswerResult, AskQuery, ContextChunk, Reference};

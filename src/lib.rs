pub mod analytics;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod rag;
pub mod server;
pub mod state;
pub mod vector;

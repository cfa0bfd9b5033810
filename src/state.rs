use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::analytics::{AnalyticsSink, SqliteAnalytics};
use crate::config::{AppPaths, Settings};
use crate::embedding::HttpEmbedder;
use crate::llm::{Generator, OpenAiCompatGenerator};
use crate::memory::{MemoryStore, SqliteMemoryStore};
use crate::rag::RagPipeline;
use crate::vector::SqliteVectorStore;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to initialize memory store: {0}")]
    Memory(#[source] anyhow::Error),

    #[error("Failed to initialize vector store: {0}")]
    Vector(#[source] anyhow::Error),

    #[error("Failed to initialize analytics store: {0}")]
    Analytics(#[source] anyhow::Error),
}

/// Global application state shared across all routes.
///
/// Every collaborator is constructed exactly once here and injected into
/// the pipeline; handlers reach the stores only through this struct.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Settings,
    pub pipeline: Arc<RagPipeline>,
    pub memory: Arc<dyn MemoryStore>,
    pub generator: Arc<dyn Generator>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Resolving paths and environment settings
    /// 2. Opening the sqlite stores (memory, vectors, analytics)
    /// 3. Constructing the HTTP clients for embedding and generation
    /// 4. Wiring the answering pipeline
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let settings = Settings::from_env();

        let memory: Arc<dyn MemoryStore> = Arc::new(
            SqliteMemoryStore::new(&paths, settings.max_chat_history)
                .await
                .map_err(|e| InitializationError::Memory(e.into()))?,
        );

        let vectors = Arc::new(
            SqliteVectorStore::new(&paths)
                .await
                .map_err(|e| InitializationError::Vector(e.into()))?,
        );

        let analytics: Arc<dyn AnalyticsSink> = Arc::new(
            SqliteAnalytics::new(&paths)
                .await
                .map_err(|e| InitializationError::Analytics(e.into()))?,
        );

        let embedder = Arc::new(HttpEmbedder::from_settings(&settings));
        let generator: Arc<dyn Generator> =
            Arc::new(OpenAiCompatGenerator::from_settings(&settings));

        let pipeline = Arc::new(RagPipeline::new(
            embedder,
            vectors,
            generator.clone(),
            memory.clone(),
            analytics,
            settings.chat_context_window,
        ));

        Ok(Arc::new(AppState {
            paths,
            settings,
            pipeline,
            memory,
            generator,
            started_at: Utc::now(),
        }))
    }
}

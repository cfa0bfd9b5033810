//! Conversational memory: prior question/answer turns and per-user
//! preferences. The pipeline reads and writes through [`MemoryStore`];
//! the primary implementation is `SqliteMemoryStore`.

pub mod sqlite;

pub use sqlite::SqliteMemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ApiError;

/// One persisted question/answer exchange. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub owner_id: String,
    pub question: String,
    pub answer: String,
    /// Source references as stored at answer time (JSON array).
    pub sources: Value,
    pub created_at: String,
}

/// A turn about to be saved; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub owner_id: String,
    pub question: String,
    pub answer: String,
    pub sources: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    pub owner_id: String,
    pub memory_enabled: bool,
    pub max_context_turns: i64,
    pub language: String,
}

impl UserPreferences {
    pub fn defaults(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            memory_enabled: true,
            max_context_turns: 3,
            language: "en".to_string(),
        }
    }
}

/// Partial preference update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub memory_enabled: Option<bool>,
    pub max_context_turns: Option<i64>,
    pub language: Option<String>,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Fetch preferences, lazily creating defaults on first read.
    async fn get_preferences(&self, owner_id: &str) -> Result<UserPreferences, ApiError>;

    async fn update_preferences(
        &self,
        owner_id: &str,
        update: PreferencesUpdate,
    ) -> Result<UserPreferences, ApiError>;

    /// The most recent `limit` turns, ordered oldest to newest so they read
    /// naturally in a prompt.
    async fn get_recent_turns(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, ApiError>;

    /// Up to `limit` turns, newest first.
    async fn get_all_turns(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, ApiError>;

    /// Persist a turn, pruning the owner's history beyond the retention cap.
    async fn save_turn(&self, turn: NewTurn) -> Result<ConversationTurn, ApiError>;

    async fn delete_turn(&self, owner_id: &str, turn_id: &str) -> Result<bool, ApiError>;

    /// Delete all turns for an owner. Returns the number removed.
    async fn delete_owner_history(&self, owner_id: &str) -> Result<usize, ApiError>;
}

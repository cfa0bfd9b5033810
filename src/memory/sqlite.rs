//! SQLite-backed memory store for conversation turns and preferences.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{ConversationTurn, MemoryStore, NewTurn, PreferencesUpdate, UserPreferences};
use crate::config::AppPaths;
use crate::errors::ApiError;

const DEFAULT_MAX_HISTORY: usize = 50;

pub struct SqliteMemoryStore {
    pool: SqlitePool,
    max_history: usize,
}

impl SqliteMemoryStore {
    pub async fn new(paths: &AppPaths, max_history: usize) -> Result<Self, ApiError> {
        Self::with_path(paths.memory_db_path.clone(), max_history).await
    }

    pub async fn with_path(db_path: PathBuf, max_history: usize) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self {
            pool,
            max_history: if max_history == 0 {
                DEFAULT_MAX_HISTORY
            } else {
                max_history
            },
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversation_turns (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                sources TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_owner ON conversation_turns(owner_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_preferences (
                owner_id TEXT PRIMARY KEY,
                memory_enabled INTEGER NOT NULL DEFAULT 1,
                max_context_turns INTEGER NOT NULL DEFAULT 3,
                language TEXT NOT NULL DEFAULT 'en'
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn turn_from_row(row: &sqlx::sqlite::SqliteRow) -> ConversationTurn {
        let sources_str: String = row.get("sources");
        let sources =
            serde_json::from_str::<Value>(&sources_str).unwrap_or(Value::Array(Vec::new()));

        ConversationTurn {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            question: row.get("question"),
            answer: row.get("answer"),
            sources,
            created_at: row.get("created_at"),
        }
    }

    fn preferences_from_row(row: &sqlx::sqlite::SqliteRow) -> UserPreferences {
        let memory_enabled: i64 = row.get("memory_enabled");
        UserPreferences {
            owner_id: row.get("owner_id"),
            memory_enabled: memory_enabled != 0,
            max_context_turns: row.get("max_context_turns"),
            language: row.get("language"),
        }
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn get_preferences(&self, owner_id: &str) -> Result<UserPreferences, ApiError> {
        let row = sqlx::query(
            "SELECT owner_id, memory_enabled, max_context_turns, language
             FROM user_preferences WHERE owner_id = ?1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if let Some(row) = row {
            return Ok(Self::preferences_from_row(&row));
        }

        let defaults = UserPreferences::defaults(owner_id);
        sqlx::query(
            "INSERT OR IGNORE INTO user_preferences
                 (owner_id, memory_enabled, max_context_turns, language)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&defaults.owner_id)
        .bind(defaults.memory_enabled as i64)
        .bind(defaults.max_context_turns)
        .bind(&defaults.language)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(defaults)
    }

    async fn update_preferences(
        &self,
        owner_id: &str,
        update: PreferencesUpdate,
    ) -> Result<UserPreferences, ApiError> {
        let mut current = self.get_preferences(owner_id).await?;

        if let Some(enabled) = update.memory_enabled {
            current.memory_enabled = enabled;
        }
        if let Some(turns) = update.max_context_turns {
            current.max_context_turns = turns.max(0);
        }
        if let Some(language) = update.language {
            let trimmed = language.trim();
            if !trimmed.is_empty() {
                current.language = trimmed.to_string();
            }
        }

        sqlx::query(
            "UPDATE user_preferences
             SET memory_enabled = ?1, max_context_turns = ?2, language = ?3
             WHERE owner_id = ?4",
        )
        .bind(current.memory_enabled as i64)
        .bind(current.max_context_turns)
        .bind(&current.language)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(current)
    }

    async fn get_recent_turns(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, ApiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "\
            SELECT id, owner_id, question, answer, sources, created_at
            FROM (
                SELECT rowid AS rid, id, owner_id, question, answer, sources, created_at
                FROM conversation_turns
                WHERE owner_id = ?1
                ORDER BY rid DESC
                LIMIT ?2
            )
            ORDER BY rid ASC",
        )
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(Self::turn_from_row).collect())
    }

    async fn get_all_turns(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, ApiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, owner_id, question, answer, sources, created_at
             FROM conversation_turns
             WHERE owner_id = ?1
             ORDER BY rowid DESC
             LIMIT ?2",
        )
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(Self::turn_from_row).collect())
    }

    async fn save_turn(&self, turn: NewTurn) -> Result<ConversationTurn, ApiError> {
        let id = Uuid::new_v4().to_string();
        let sources_str =
            serde_json::to_string(&turn.sources).unwrap_or_else(|_| "[]".to_string());

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO conversation_turns (id, owner_id, question, answer, sources)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&id)
        .bind(&turn.owner_id)
        .bind(&turn.question)
        .bind(&turn.answer)
        .bind(&sources_str)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        // Retention cap: keep only the newest max_history turns per owner.
        sqlx::query(
            "\
            DELETE FROM conversation_turns
            WHERE owner_id = ?1 AND rowid NOT IN (
                SELECT rowid FROM conversation_turns
                WHERE owner_id = ?1
                ORDER BY rowid DESC
                LIMIT ?2
            )",
        )
        .bind(&turn.owner_id)
        .bind(self.max_history as i64)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;

        let row = sqlx::query(
            "SELECT id, owner_id, question, answer, sources, created_at
             FROM conversation_turns WHERE id = ?1",
        )
        .bind(&id)
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(Self::turn_from_row(&row))
    }

    async fn delete_turn(&self, owner_id: &str, turn_id: &str) -> Result<bool, ApiError> {
        let result =
            sqlx::query("DELETE FROM conversation_turns WHERE id = ?1 AND owner_id = ?2")
                .bind(turn_id)
                .bind(owner_id)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_owner_history(&self, owner_id: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM conversation_turns WHERE owner_id = ?1")
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() as usize)
    }
}

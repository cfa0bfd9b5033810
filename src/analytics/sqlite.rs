//! SQLite-backed study session tracking.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::AnalyticsSink;
use crate::config::AppPaths;
use crate::errors::ApiError;

/// A session counts as active while it has no end time and started within
/// this window.
const ACTIVE_SESSION_WINDOW_HOURS: i64 = 4;

#[derive(Debug, Clone)]
pub struct StudySession {
    pub id: String,
    pub owner_id: String,
    pub session_start: String,
    pub session_end: Option<String>,
    pub questions_asked: i64,
    pub documents_referenced: Vec<String>,
    pub topics_covered: Vec<String>,
}

pub struct SqliteAnalytics {
    pool: SqlitePool,
}

impl SqliteAnalytics {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.analytics_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS study_sessions (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                session_start TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                session_end TEXT,
                questions_asked INTEGER NOT NULL DEFAULT 0,
                documents_referenced TEXT NOT NULL DEFAULT '[]',
                topics_covered TEXT NOT NULL DEFAULT '[]'
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_owner_start
             ON study_sessions(owner_id, session_start DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    pub async fn start_session(&self, owner_id: &str) -> Result<StudySession, ApiError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO study_sessions (id, owner_id) VALUES (?1, ?2)")
            .bind(&id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        self.get_session(&id)
            .await?
            .ok_or_else(|| ApiError::Internal("session vanished after insert".to_string()))
    }

    pub async fn end_session(&self, session_id: &str) -> Result<StudySession, ApiError> {
        let result = sqlx::query(
            "UPDATE study_sessions
             SET session_end = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1 AND session_end IS NULL",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!(
                "no open session {}",
                session_id
            )));
        }

        self.get_session(session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("session {} not found", session_id)))
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<StudySession>, ApiError> {
        let row = sqlx::query(
            "SELECT id, owner_id, session_start, session_end, questions_asked,
                    documents_referenced, topics_covered
             FROM study_sessions WHERE id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(session_from_row))
    }

    /// The owner's open session started within the active window, if any.
    pub async fn active_session(&self, owner_id: &str) -> Result<Option<StudySession>, ApiError> {
        let cutoff = (Utc::now() - Duration::hours(ACTIVE_SESSION_WINDOW_HOURS))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();

        let row = sqlx::query(
            "SELECT id, owner_id, session_start, session_end, questions_asked,
                    documents_referenced, topics_covered
             FROM study_sessions
             WHERE owner_id = ?1 AND session_end IS NULL AND session_start >= ?2
             ORDER BY session_start DESC
             LIMIT 1",
        )
        .bind(owner_id)
        .bind(&cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(session_from_row))
    }
}

#[async_trait]
impl AnalyticsSink for SqliteAnalytics {
    async fn track_question(
        &self,
        owner_id: &str,
        question: &str,
        documents: &[String],
        topics: &[String],
    ) -> Result<(), ApiError> {
        let session = match self.active_session(owner_id).await? {
            Some(session) => session,
            None => self.start_session(owner_id).await?,
        };

        let documents = merge_distinct(&session.documents_referenced, documents);
        let topics = merge_distinct(&session.topics_covered, topics);

        sqlx::query(
            "UPDATE study_sessions
             SET questions_asked = questions_asked + 1,
                 documents_referenced = ?1,
                 topics_covered = ?2
             WHERE id = ?3",
        )
        .bind(serde_json::to_string(&documents).unwrap_or_else(|_| "[]".to_string()))
        .bind(serde_json::to_string(&topics).unwrap_or_else(|_| "[]".to_string()))
        .bind(&session.id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        tracing::debug!(
            session = %session.id,
            question = %question.chars().take(80).collect::<String>(),
            "tracked question"
        );

        Ok(())
    }
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> StudySession {
    let documents_str: String = row.get("documents_referenced");
    let topics_str: String = row.get("topics_covered");

    StudySession {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        session_start: row.get("session_start"),
        session_end: row.get("session_end"),
        questions_asked: row.get("questions_asked"),
        documents_referenced: serde_json::from_str(&documents_str).unwrap_or_default(),
        topics_covered: serde_json::from_str(&topics_str).unwrap_or_default(),
    }
}

fn merge_distinct(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged = existing.to_vec();
    for item in incoming {
        if !merged.iter().any(|present| present == item) {
            merged.push(item.clone());
        }
    }
    merged
}

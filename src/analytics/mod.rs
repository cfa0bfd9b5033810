//! Study-session analytics.
//!
//! The pipeline reports answered questions through [`AnalyticsSink`] as a
//! fire-and-forget side effect; a sink failure must never fail a request.
//! `NoopAnalytics` stands in when tracking is not wired up.

pub mod sqlite;

pub use sqlite::SqliteAnalytics;

use async_trait::async_trait;

use crate::errors::ApiError;

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Record a question asked during the owner's active study session.
    async fn track_question(
        &self,
        owner_id: &str,
        question: &str,
        documents: &[String],
        topics: &[String],
    ) -> Result<(), ApiError>;
}

/// Sink that records nothing.
pub struct NoopAnalytics;

#[async_trait]
impl AnalyticsSink for NoopAnalytics {
    async fn track_question(
        &self,
        _owner_id: &str,
        _question: &str,
        _documents: &[String],
        _topics: &[String],
    ) -> Result<(), ApiError> {
        Ok(())
    }
}

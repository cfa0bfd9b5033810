use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::errors::ApiError;
use crate::rag::AskQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub user_id: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_answer_tokens")]
    pub max_answer_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_use_memory")]
    pub use_memory: bool,
}

fn default_top_k() -> usize {
    3
}

fn default_max_answer_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.7
}

fn default_use_memory() -> bool {
    true
}

impl AskRequest {
    fn into_query(self) -> AskQuery {
        AskQuery {
            text: self.question,
            owner_id: self.user_id,
            top_k: self.top_k,
            max_answer_tokens: self.max_answer_tokens,
            temperature: self.temperature,
            use_memory: self.use_memory,
        }
    }
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let query = payload.into_query();
    query.validate()?;

    let result = state.pipeline.ask(&query).await;
    Ok(Json(json!({
        "answer": result.answer_text,
        "references": result.references,
        "used_memory": result.used_memory,
    })))
}

/// Readiness of the answering path: reports whether the generator has
/// credentials and whether its endpoint responds.
pub async fn ask_health(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let configured = state.generator.is_configured();
    let reachable = if configured {
        state.generator.health_check().await.unwrap_or(false)
    } else {
        false
    };

    Ok(Json(json!({
        "status": if configured && reachable { "ok" } else { "degraded" },
        "generator": state.generator.name(),
        "configured": configured,
        "reachable": reachable,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_apply_when_fields_are_absent() {
        let payload: AskRequest = serde_json::from_str(
            r#"{"question": "What is mitosis?", "user_id": "u1"}"#,
        )
        .unwrap();

        assert_eq!(payload.top_k, 3);
        assert_eq!(payload.max_answer_tokens, 512);
        assert_eq!(payload.temperature, 0.7);
        assert!(payload.use_memory);
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let payload: AskRequest = serde_json::from_str(
            r#"{
                "question": "q",
                "user_id": "u1",
                "top_k": 5,
                "max_answer_tokens": 256,
                "temperature": 0.2,
                "use_memory": false
            }"#,
        )
        .unwrap();

        let query = payload.into_query();
        assert_eq!(query.top_k, 5);
        assert_eq!(query.max_answer_tokens, 256);
        assert_eq!(query.temperature, 0.2);
        assert!(!query.use_memory);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn out_of_range_request_fails_validation() {
        let payload: AskRequest = serde_json::from_str(
            r#"{"question": "q", "user_id": "u1", "top_k": 11}"#,
        )
        .unwrap();
        assert!(payload.into_query().validate().is_err());
    }
}

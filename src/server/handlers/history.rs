use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::errors::ApiError;
use crate::memory::PreferencesUpdate;
use crate::state::AppState;

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(50);

    let turns = state.memory.get_all_turns(&owner_id, limit).await?;
    Ok(Json(json!({"turns": turns})))
}

pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.memory.delete_owner_history(&owner_id).await?;
    Ok(Json(json!({"deleted": deleted})))
}

pub async fn delete_turn(
    State(state): State<Arc<AppState>>,
    Path((owner_id, turn_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.memory.delete_turn(&owner_id, &turn_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Turn not found".to_string()));
    }
    Ok(Json(json!({"success": true})))
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let preferences = state.memory.get_preferences(&owner_id).await?;
    Ok(Json(json!({"preferences": preferences})))
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Json(payload): Json<PreferencesUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(turns) = payload.max_context_turns {
        if !(0..=20).contains(&turns) {
            return Err(ApiError::BadRequest(
                "max_context_turns must be between 0 and 20".to_string(),
            ));
        }
    }

    let preferences = state.memory.update_preferences(&owner_id, payload).await?;
    Ok(Json(json!({"preferences": preferences})))
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::{internal, not_found, ApiError};

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let workspaces = state
        .store
        .list_workspaces(&state.project_id)
        .map_err(internal)?;
    Ok(Json(json!({ "workspaces": workspaces })))
}

/// Full payload: metadata + pages with highlights + notes.
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let detail = state
        .store
        .get_workspace(&state.project_id, &slug)
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("workspace '{slug}'")))?;
    serde_json::to_value(&detail)
        .map(Json)
        .map_err(internal)
}

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::{internal, not_found, ApiError};

/// Project metadata enriched with knowledge-store counts.
pub async fn project(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let project = state
        .store
        .get_project(&state.project_id)
        .map_err(internal)?
        .ok_or_else(|| not_found("project"))?;

    let (page_count, pointer_count, discipline_count) = {
        let knowledge = state.knowledge.read();
        (
            knowledge.pages.len(),
            knowledge.pointer_count(),
            knowledge.disciplines.len(),
        )
    };

    Ok(Json(json!({
        "id": project.id,
        "name": project.name,
        "path": project.path,
        "created_at": project.created_at,
        "page_count": page_count,
        "pointer_count": pointer_count,
        "discipline_count": discipline_count,
    })))
}

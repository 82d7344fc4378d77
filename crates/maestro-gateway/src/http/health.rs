use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let conversation = state.conversation.lock().await;
    Json(json!({
        "status": "ok",
        "engine": conversation.engine_name(),
        "project_id": state.project_id,
        "time": chrono::Utc::now().to_rfc3339(),
        "tools": conversation.tool_count(),
    }))
}

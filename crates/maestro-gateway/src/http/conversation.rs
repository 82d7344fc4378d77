use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::{internal, ApiError};

/// Persisted conversation state merged with live stats.
pub async fn state(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let row = state
        .store
        .get_or_create_conversation(&state.project_id)
        .map_err(internal)?;
    let stats = {
        let conversation = state.conversation.lock().await;
        conversation.get_stats().map_err(internal)?
    };
    Ok(Json(json!({
        "summary": row.summary,
        "total_exchanges": row.total_exchanges,
        "compactions": row.compactions,
        "last_compaction": row.last_compaction,
        "created_at": row.created_at,
        "stats": stats,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
    pub before: Option<i64>,
}

/// Paginated messages, newest first.
pub async fn messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(50).min(500);
    let rows = state
        .store
        .get_messages_page(&state.project_id, limit, query.before)
        .map_err(internal)?;
    let next_before = rows.last().map(|m| m.id);
    Ok(Json(json!({
        "messages": rows,
        "next_before": next_before,
    })))
}

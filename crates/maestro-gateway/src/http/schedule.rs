use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::{internal, not_found, ApiError};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub event_type: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let events = state
        .store
        .list_events(
            &state.project_id,
            query.from_date.as_deref(),
            query.to_date.as_deref(),
            query.event_type.as_deref(),
        )
        .map_err(internal)?;
    Ok(Json(json!({ "events": events })))
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub days: Option<i64>,
}

pub async fn upcoming(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UpcomingQuery>,
) -> Result<Json<Value>, ApiError> {
    let days = query.days.unwrap_or(7);
    let events = state
        .store
        .upcoming_events(&state.project_id, days)
        .map_err(internal)?;
    Ok(Json(json!({ "days": days, "events": events })))
}

pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let event = state
        .store
        .get_event(&state.project_id, &event_id)
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("event '{event_id}'")))?;
    serde_json::to_value(&event).map(Json).map_err(internal)
}

//! Read-only REST surface. All mutation happens through conversation turns.

pub mod conversation;
pub mod health;
pub mod knowledge;
pub mod project;
pub mod schedule;
pub mod workspaces;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn not_found(what: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("{what} not found")})),
    )
}

pub(crate) fn internal(err: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": err.to_string()})),
    )
}

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;

use maestro_agent::Conversation;
use maestro_core::config::MaestroConfig;
use maestro_core::events::EventBus;
use maestro_knowledge::Knowledge;
use maestro_store::Store;

use crate::sender::Sender;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: MaestroConfig,
    pub store: Arc<Store>,
    pub knowledge: Arc<Knowledge>,
    pub bus: EventBus,
    /// Single-writer lock: one model turn (user or heartbeat) at a time.
    pub conversation: Arc<Mutex<Conversation>>,
    pub sender: Arc<dyn Sender>,
    pub project_id: String,
    /// The one configured super; anything else is dropped at the webhook.
    pub super_phone: String,
    pub ws_clients: AtomicUsize,
    pub thumb_cache_dir: PathBuf,
}

/// Assemble the full Axum router: read-only REST under /api, the event
/// WebSocket, and the inbound message webhook.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(crate::http::health::health))
        .route("/api/project", get(crate::http::project::project))
        .route("/api/workspaces", get(crate::http::workspaces::list))
        .route("/api/workspaces/{slug}", get(crate::http::workspaces::detail))
        .route("/api/schedule", get(crate::http::schedule::list))
        .route("/api/schedule/upcoming", get(crate::http::schedule::upcoming))
        .route("/api/schedule/{event_id}", get(crate::http::schedule::detail))
        .route("/api/conversation", get(crate::http::conversation::state))
        .route(
            "/api/conversation/messages",
            get(crate::http::conversation::messages),
        )
        .route(
            "/api/knowledge/disciplines",
            get(crate::http::knowledge::disciplines),
        )
        .route("/api/knowledge/pages", get(crate::http::knowledge::pages))
        .route(
            "/api/knowledge/pages/{name}",
            get(crate::http::knowledge::page_detail),
        )
        .route("/api/knowledge/search", get(crate::http::knowledge::search))
        .route(
            "/api/knowledge/page-thumb/{name}",
            get(crate::http::knowledge::page_thumb),
        )
        .route("/ws", get(crate::ws::ws_handler))
        .route("/webhook", post(crate::webhook::webhook_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

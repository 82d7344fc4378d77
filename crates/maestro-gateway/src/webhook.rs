//! Inbound text-message webhook.
//!
//! Drop rules, in order: sender is not the configured super; sender is our
//! own send number (outbound echo); both content and media are empty.
//! Accepted messages enqueue one conversation turn and the webhook answers
//! immediately — the reply goes out through the sender once the turn
//! completes.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::AppState;
use crate::sender::format_for_text;

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub from_number: Option<String>,
    /// Some providers put the sender under `number` instead.
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_url: Option<String>,
}

pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InboundMessage>,
) -> Json<Value> {
    let from_number = body
        .from_number
        .or(body.number)
        .unwrap_or_default();
    let content = body.content.trim().to_string();
    let has_media = body.media_url.as_deref().is_some_and(|m| !m.is_empty());

    if content.is_empty() && !has_media {
        return Json(json!({"status": "ignored", "reason": "empty message"}));
    }
    if from_number.is_empty() {
        return Json(json!({"status": "ignored", "reason": "no sender"}));
    }
    if from_number == state.config.messaging.from_number {
        return Json(json!({"status": "ignored", "reason": "outbound echo"}));
    }
    if from_number != state.super_phone {
        warn!(%from_number, "message from unknown number dropped");
        return Json(json!({"status": "ignored", "reason": "unknown number"}));
    }

    info!(%from_number, chars = content.len(), "inbound text");

    // One turn at a time: the conversation mutex queues this behind any
    // in-flight turn. The webhook answers immediately.
    tokio::spawn(handle_message(state, from_number, content));
    Json(json!({"status": "ok"}))
}

async fn handle_message(state: Arc<AppState>, from_number: String, content: String) {
    state.sender.typing_indicator(&from_number).await;

    let (result, stats) = {
        let mut conversation = state.conversation.lock().await;
        let result = conversation.send(&content).await;
        (result, conversation.get_stats().ok())
    };

    // status pulse so the dashboard can track context usage per turn
    if let Some(payload) = stats {
        state.bus.emit(maestro_core::events::Event::Status { payload });
    }

    match result {
        Ok(response) if !response.is_empty() => {
            let formatted = format_for_text(&response);
            if let Err(e) = state.sender.send_text(&from_number, &formatted).await {
                warn!(error = %e, "failed to send reply");
            }
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "turn failed");
            let _ = state
                .sender
                .send_text(
                    &from_number,
                    "Sorry, I hit an error processing that. Try again?",
                )
                .await;
        }
    }
}

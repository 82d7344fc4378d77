//! Dashboard WebSocket.
//!
//! Send-only event stream: on connect the client gets a `connected` frame,
//! then every bus event as it happens. The only inbound message handled is
//! the literal text `"ping"`, answered with a `pong` frame. A failed send
//! drops the subscriber.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use maestro_core::events::Event;

use crate::app::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let clients = state.ws_clients.fetch_add(1, Ordering::SeqCst) + 1;
    info!(clients, "dashboard connected");

    let (mut tx, mut rx) = socket.split();
    let mut bus_rx = state.bus.subscribe();

    let connected = Event::Connected { clients }.envelope();
    if tx
        .send(Message::Text(connected.to_string().into()))
        .await
        .is_err()
    {
        state.ws_clients.fetch_sub(1, Ordering::SeqCst);
        return;
    }

    loop {
        tokio::select! {
            // bus event → forward; a failed send drops the subscriber
            event = bus_rx.recv() => {
                match event {
                    Ok(payload) => {
                        if tx.send(Message::Text(payload.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    // fell behind the broadcast buffer; skip the lost events
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "slow dashboard client lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str().trim() == "ping" {
                            let pong = Event::Pong.envelope();
                            if tx.send(Message::Text(pong.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        // everything else: server is send-only, ignore
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    let remaining = state.ws_clients.fetch_sub(1, Ordering::SeqCst) - 1;
    info!(clients = remaining, "dashboard disconnected");
}

//! HTTP route handlers for the relay bridge.
//!
//! UI surfaces post messages to `/message` and subscribe to `/events` for
//! auth-state changes and capture requests instead of polling storage.

use crate::models::{RelayEvent, Response};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/message", post(message))
        .route("/events", get(events))
        .route("/health", get(health))
        .with_state(state)
}

// ============================================================================
// Message Handler
// ============================================================================

pub async fn message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<serde_json::Value>,
) -> Json<Response> {
    Json(state.request(message).await)
}

// ============================================================================
// Health Handler
// ============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "authState": state.auth.state(),
        "backend": state.locator.active_base().map(|u| u.to_string()),
    }))
}

// ============================================================================
// Event Stream
// ============================================================================

pub async fn events(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events(socket, state))
}

fn auth_event(state: &AppState) -> RelayEvent {
    let snapshot = state.auth.snapshot();
    RelayEvent::AuthStateChanged {
        state: snapshot.state,
        user: snapshot.user().cloned(),
    }
}

async fn send_event(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &RelayEvent,
) -> bool {
    let Ok(json) = serde_json::to_string(event) else {
        return false;
    };
    ws_tx.send(Message::Text(json.into())).await.is_ok()
}

async fn handle_events(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut auth_rx = state.auth.subscribe();
    let mut event_rx = state.events.subscribe();

    // Current state first, so a fresh subscriber never has to ask.
    let _ = auth_rx.borrow_and_update();
    if !send_event(&mut ws_tx, &auth_event(&state)).await {
        return;
    }

    loop {
        tokio::select! {
            changed = auth_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let _ = auth_rx.borrow_and_update();
                if !send_event(&mut ws_tx, &auth_event(&state)).await {
                    break;
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !send_event(&mut ws_tx, &event).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("event subscriber disconnected");
}

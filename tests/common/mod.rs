//! Shared helpers for relay integration tests: a stateful fake notes backend
//! and addresses that refuse connections.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use kg_notes_relay::config::RelayConfig;
use kg_notes_relay::models::AuthMode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct BackendState {
    pub notes: Mutex<Vec<Value>>,
    /// Status returned by `GET /auth/me`; 0 means 200.
    pub me_status: AtomicU16,
    pub exchanges: Mutex<Vec<Value>>,
}

pub struct FakeBackend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        let app = Router::new()
            .route("/auth/chrome-extension", post(exchange))
            .route("/auth/me", get(me))
            .route("/notes", post(create_note).get(list_notes))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn reject_auth_me(&self, status: u16) {
        self.state.me_status.store(status, Ordering::SeqCst);
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.to_string())
}

async fn exchange(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Json<Value> {
    let user_id = body["user_info"]["id"].as_str().unwrap_or("unknown").to_string();
    state.exchanges.lock().unwrap().push(body.clone());
    Json(json!({
        "access_token": format!("backend-{}", user_id),
        "token_type": "bearer",
        "user_id": user_id,
        "email": body["user_info"]["email"],
        "name": body["user_info"]["name"],
        "expires_in": 3600
    }))
}

async fn me(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> StatusCode {
    match state.me_status.load(Ordering::SeqCst) {
        0 if bearer(&headers).is_some() => StatusCode::OK,
        0 => StatusCode::UNAUTHORIZED,
        status => StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED),
    }
}

async fn create_note(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "missing token"})));
    }
    let mut notes = state.notes.lock().unwrap();
    let id = format!("note-{}", notes.len() + 1);
    let mut note = body;
    note["id"] = json!(id);
    notes.push(note);
    (StatusCode::OK, Json(json!({"noteId": id})))
}

async fn list_notes(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "missing token"})));
    }
    let notes = state.notes.lock().unwrap().clone();
    (StatusCode::OK, Json(json!({"notes": notes})))
}

/// A loopback URL with nothing listening on it.
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn config(candidates: Vec<String>, mode: AuthMode) -> RelayConfig {
    RelayConfig {
        backend_candidates: candidates,
        auth_mode: mode,
        backend_timeout_secs: 2,
        request_timeout_secs: 5,
        ..RelayConfig::default()
    }
}

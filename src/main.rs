//! Notes relay - background service for the knowledge graph notes extension.
//!
//! This is the main entry point for the relay. The application is organized
//! into the following modules:
//!
//! - `models`: Session, page context, and request/response contracts
//! - `token_store`: Persisted Session record
//! - `identity`: Third-party identity tokens and profiles
//! - `auth`: Authentication state machine
//! - `locator`: Backend discovery across candidate addresses
//! - `notes`: Note submission and listing
//! - `capture`: Capture surface coordination
//! - `router`: Typed message dispatch
//! - `handlers`: HTTP/WebSocket bridge for UI surfaces

use std::path::PathBuf;
use std::sync::Arc;

use kg_notes_relay::{config::RelayConfig, handlers, AppState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kg_notes_relay=info")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match RelayConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    let state = match AppState::from_config(&config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!(error = %e, "failed to start relay");
            std::process::exit(1);
        }
    };

    // Restore runs in the background; messages arriving meanwhile that need
    // a session fail with NotAuthenticated.
    let auth = state.auth.clone();
    tokio::spawn(async move {
        let restored = auth.restore().await;
        info!(state = ?restored, "auth restore finished");
    });

    let app = handlers::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind relay address");

    info!("Notes relay running at http://{}", config.listen_addr);
    info!("Backend candidates: {}", config.backend_candidates.join(", "));
    info!("Auth mode: {}", config.auth_mode.as_str());

    axum::serve(listener, app).await.expect("Server error");
}

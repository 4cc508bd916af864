//! Notes relay library - re-exports for testing and external use.
//!
//! The relay sits between the notes extension's UI surfaces and the notes
//! backend. It owns the user's Session, finds a reachable backend, and
//! answers typed requests from popups, capture windows and content scripts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

pub mod auth;
pub mod capture;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod locator;
pub mod models;
pub mod notes;
pub mod router;
pub mod token_store;

use auth::AuthManager;
use capture::{CaptureCoordinator, EventCaptureSurface};
use config::RelayConfig;
use error::{RelayError, Result};
use identity::{DevelopmentIdentity, GoogleIdentity, IdentityProvider};
use locator::BackendLocator;
use models::{AuthMode, RelayEvent, Response};
use notes::NoteService;
use router::MessageRouter;
use token_store::TokenStore;

// ============================================================================
// Configuration
// ============================================================================

pub const DB_PATH: &str = ".kg_notes_db";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3917";
pub const DEFAULT_BACKEND_CANDIDATES: &[&str] = &["http://localhost:8000", "http://localhost:8080"];
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const SESSION_MAX_AGE_DAYS: i64 = 30;
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<MessageRouter>,
    pub auth: Arc<AuthManager>,
    pub locator: Arc<BackendLocator>,
    pub events: broadcast::Sender<RelayEvent>,
    pub request_timeout: Duration,
}

impl AppState {
    /// Wire every component from configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let db = sled::open(&config.db_path)?;
        let store = TokenStore::open(&db)?;

        let identity: Arc<dyn IdentityProvider> = match config.auth_mode {
            AuthMode::Development => Arc::new(DevelopmentIdentity),
            AuthMode::Production => Arc::new(GoogleIdentity::new(
                &config.userinfo_url,
                &config.revoke_url,
                config.identity_command.clone(),
            )?),
        };

        Self::with_parts(config, store, identity)
    }

    /// Wire from explicit store and identity provider.
    pub fn with_parts(
        config: &RelayConfig,
        store: TokenStore,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let locator = Arc::new(BackendLocator::new(
            config.candidate_urls()?,
            Duration::from_secs(config.backend_timeout_secs),
        )?);
        let auth = Arc::new(AuthManager::new(
            store,
            locator.clone(),
            identity,
            config.auth_mode,
            config.session_max_age(),
        ));

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let capture = CaptureCoordinator::new(Box::new(EventCaptureSurface::new(events.clone())));
        let notes = NoteService::new(auth.clone(), locator.clone());
        let router = Arc::new(MessageRouter::new(auth.clone(), notes, capture));

        Ok(Self {
            router,
            auth,
            locator,
            events,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Route one message on its own task and wait up to `request_timeout`.
    ///
    /// On timeout the caller gets a `Timeout` failure; the spawned handler is
    /// not cancelled and finishes in the background.
    pub async fn request(&self, message: serde_json::Value) -> Response {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let router = self.router.clone();
        tokio::spawn(async move {
            router
                .handle(message, move |response| {
                    let _ = tx.send(response);
                })
                .await;
        });

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => Response::failure("Handler dropped without responding"),
            Err(_) => Response::from_error(&RelayError::Timeout(self.request_timeout.as_secs())),
        }
    }
}

// Re-export commonly used types
pub use models::{
    AuthState, ContextMenuClick, ContextMenuItem, IdentityProfile, NoteRequest, PageContext,
    QuickNote, Request, Session, User, YoutubeContext,
};

pub use auth::{mint_local_token, AuthSnapshot};
pub use capture::{context_menu_content, format_timestamp, timestamped_url, CaptureSurface};
pub use locator::{EndpointSelection, FixedOrder, RequestOptions, StickyFirstSuccess};

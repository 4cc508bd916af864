//! Authentication state machine and Session ownership.
//!
//! `AuthManager` is the only writer of the Session. Mutating operations
//! (`authenticate`, `restore`, `logout`) are serialized by a single
//! in-flight guard; readers go through a watch channel and never wait on it.
//!
//! States: `SignedOut -> Authenticating -> SignedIn`, and on startup
//! `SignedOut -> SilentlyRefreshing -> SignedIn | SignedOut` when the backend
//! rejects a stored token.

use crate::error::{RelayError, Result};
use crate::identity::IdentityProvider;
use crate::locator::{BackendLocator, RequestOptions};
use crate::models::{
    AuthMode, AuthState, IdentityProfile, Session, TokenExchangeRequest, TokenExchangeResponse,
    User, LOCAL_TOKEN_PREFIX,
};
use crate::token_store::TokenStore;
use chrono::Utc;
use rand::Rng;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

/// Point-in-time view of the auth state.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub session: Option<Session>,
}

impl AuthSnapshot {
    fn signed_out() -> Self {
        Self {
            state: AuthState::SignedOut,
            session: None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }
}

pub struct AuthManager {
    store: TokenStore,
    locator: Arc<BackendLocator>,
    identity: Arc<dyn IdentityProvider>,
    mode: AuthMode,
    max_age: chrono::Duration,
    op_guard: AsyncMutex<()>,
    /// Last raw identity token, kept for cache removal and revocation.
    identity_token: Mutex<Option<String>>,
    state: watch::Sender<AuthSnapshot>,
}

impl AuthManager {
    pub fn new(
        store: TokenStore,
        locator: Arc<BackendLocator>,
        identity: Arc<dyn IdentityProvider>,
        mode: AuthMode,
        max_age: chrono::Duration,
    ) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::signed_out());
        Self {
            store,
            locator,
            identity,
            mode,
            max_age,
            op_guard: AsyncMutex::new(()),
            identity_token: Mutex::new(None),
            state,
        }
    }

    // ------------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().state
    }

    pub fn access_token(&self) -> Option<String> {
        self.state
            .borrow()
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    /// Receives every state transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    fn publish(&self, state: AuthState, session: Option<Session>) {
        self.state.send_replace(AuthSnapshot { state, session });
    }

    fn remember_identity_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.identity_token.lock() {
            *slot = token;
        }
    }

    // ------------------------------------------------------------------------
    // authenticate
    // ------------------------------------------------------------------------

    /// Interactive sign-in. Waits for any in-flight auth operation first.
    pub async fn authenticate(&self) -> Result<User> {
        let _guard = self.op_guard.lock().await;
        self.authenticate_locked().await
    }

    /// Like `authenticate`, but gives up with `NotAuthenticated` instead of
    /// queueing behind a restore or sign-in that is still running.
    pub async fn try_authenticate(&self) -> Result<User> {
        let Ok(_guard) = self.op_guard.try_lock() else {
            info!("auth operation in flight, not starting another");
            return Err(RelayError::NotAuthenticated);
        };
        self.authenticate_locked().await
    }

    async fn authenticate_locked(&self) -> Result<User> {
        let previous = self.snapshot();
        self.publish(AuthState::Authenticating, previous.session.clone());

        match self.sign_in().await {
            Ok(session) => {
                let user = session.user.clone();
                info!(email = %user.email, local = session.is_local(), "authentication successful");
                self.publish(AuthState::SignedIn, Some(session));
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "authentication failed");
                self.publish(previous.state, previous.session);
                Err(e)
            }
        }
    }

    /// Profile for `token`. A token the identity service refuses is evicted
    /// from the provider's cache so the next acquisition fetches a new one.
    async fn profile_for(&self, token: &str) -> Result<IdentityProfile> {
        match self.identity.fetch_profile(token).await {
            Ok(profile) => Ok(profile),
            Err(e) => {
                debug!(error = %e, "profile lookup failed, dropping cached identity token");
                self.identity.remove_cached_token(token).await;
                Err(e)
            }
        }
    }

    async fn sign_in(&self) -> Result<Session> {
        let identity_token = self.identity.acquire_token(true).await?;
        let profile = self.profile_for(&identity_token).await?;
        self.remember_identity_token(Some(identity_token.clone()));

        let session = match self.exchange(&identity_token, &profile).await {
            Ok(exchanged) => Session::new(
                exchanged.access_token,
                User {
                    user_id: exchanged.user_id,
                    email: exchanged.email.unwrap_or_else(|| profile.email.clone()),
                    name: exchanged.name.unwrap_or_else(|| profile.name.clone()),
                    is_anonymous: false,
                },
                self.mode,
            ),
            Err(e) => {
                warn!(error = %e, "backend unavailable, using local authentication");
                Session::new(mint_local_token(), profile.to_user(), self.mode)
            }
        };

        self.store.save(&session)?;
        Ok(session)
    }

    /// Trade an identity token for backend-issued credentials.
    async fn exchange(
        &self,
        identity_token: &str,
        profile: &IdentityProfile,
    ) -> Result<TokenExchangeResponse> {
        let body = TokenExchangeRequest {
            access_token: identity_token,
            user_info: profile,
        };
        let response = self
            .locator
            .call("/auth/chrome-extension", &RequestOptions::post_json(&body)?)
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RelayError::BackendRejected {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    // ------------------------------------------------------------------------
    // restore
    // ------------------------------------------------------------------------

    /// Restore a persisted Session at startup. Failures are logged only; the
    /// resulting state is returned.
    pub async fn restore(&self) -> AuthState {
        let _guard = self.op_guard.lock().await;

        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                error!(error = %e, "failed to read stored authentication");
                None
            }
        };

        let Some(stored) = stored.filter(|s| s.persistent_login) else {
            info!("no stored authentication found");
            self.publish(AuthState::SignedOut, None);
            return AuthState::SignedOut;
        };

        if stored.is_expired(Utc::now(), self.max_age) {
            info!("stored authentication is too old, clearing");
            self.clear_store();
            self.publish(AuthState::SignedOut, None);
            return AuthState::SignedOut;
        }

        let options = RequestOptions::get().bearer(&stored.access_token);
        match self.locator.call("/auth/me", &options).await {
            Ok(response) if response.status().is_success() => {
                info!(email = %stored.user.email, "restored authentication");
                self.publish(AuthState::SignedIn, Some(stored));
                AuthState::SignedIn
            }
            Ok(response) => {
                info!(
                    status = response.status().as_u16(),
                    "stored token rejected, attempting silent refresh"
                );
                self.silent_refresh(stored.auth_mode).await
            }
            Err(e) => {
                info!(error = %e, email = %stored.user.email, "cannot verify token, trusting cached session");
                self.publish(AuthState::SignedIn, Some(stored));
                AuthState::SignedIn
            }
        }
    }

    async fn silent_refresh(&self, mode: AuthMode) -> AuthState {
        self.publish(AuthState::SilentlyRefreshing, None);

        let refreshed = async {
            let token = self.identity.acquire_token(false).await?;
            let profile = self.profile_for(&token).await?;
            self.remember_identity_token(Some(token.clone()));
            let session = Session::new(token, profile.to_user(), mode);
            self.store.save(&session)?;
            Ok::<_, RelayError>(session)
        }
        .await;

        match refreshed {
            Ok(session) => {
                info!(email = %session.user.email, "silent authentication successful");
                self.publish(AuthState::SignedIn, Some(session));
                AuthState::SignedIn
            }
            Err(e) => {
                info!(error = %e, "silent authentication failed, clearing stored session");
                self.remember_identity_token(None);
                self.clear_store();
                self.publish(AuthState::SignedOut, None);
                AuthState::SignedOut
            }
        }
    }

    // ------------------------------------------------------------------------
    // logout
    // ------------------------------------------------------------------------

    /// Revoke (best-effort), clear storage, drop the in-memory Session.
    /// Safe to call when already signed out.
    pub async fn logout(&self) {
        let _guard = self.op_guard.lock().await;

        let identity_token = self
            .identity_token
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        let revocable = identity_token.or_else(|| {
            self.access_token()
                .filter(|t| !t.starts_with(LOCAL_TOKEN_PREFIX))
        });

        if let Some(token) = revocable {
            self.identity.remove_cached_token(&token).await;
            match self.identity.revoke(&token).await {
                Ok(()) => info!("identity token revoked"),
                Err(e) => warn!(error = %e, "failed to revoke token"),
            }
        }

        self.clear_store();
        self.publish(AuthState::SignedOut, None);
        info!("logged out, authentication data cleared");
    }

    #[cfg(test)]
    pub(crate) async fn op_guard_for_tests(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.op_guard.lock().await
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to remove auth keys, wiping store");
            if let Err(e) = self.store.clear_all() {
                error!(error = %e, "failed to wipe auth store");
            }
        }
    }
}

/// `local_<epoch millis>_<9 lowercase alphanumerics>`
pub fn mint_local_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!(
        "{}{}_{}",
        LOCAL_TOKEN_PREFIX,
        Utc::now().timestamp_millis(),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{DevelopmentIdentity, GoogleIdentity};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::time::Duration as StdDuration;
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeIdentity {
        interactive: Option<&'static str>,
        silent: Option<&'static str>,
        reject_profiles: bool,
        revoked: Mutex<Vec<String>>,
        evicted: Mutex<Vec<String>>,
    }

    impl FakeIdentity {
        fn new(interactive: Option<&'static str>, silent: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                interactive,
                silent,
                reject_profiles: false,
                revoked: Mutex::new(Vec::new()),
                evicted: Mutex::new(Vec::new()),
            })
        }

        /// Hands out tokens, but the profile endpoint refuses all of them.
        fn rejecting_profiles(
            interactive: Option<&'static str>,
            silent: Option<&'static str>,
        ) -> Arc<Self> {
            Arc::new(Self {
                interactive,
                silent,
                reject_profiles: true,
                revoked: Mutex::new(Vec::new()),
                evicted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        async fn acquire_token(&self, interactive: bool) -> Result<String> {
            let token = if interactive { self.interactive } else { self.silent };
            token
                .map(|t| t.to_string())
                .ok_or_else(|| RelayError::IdentityAcquisitionFailed("denied".to_string()))
        }

        async fn fetch_profile(&self, token: &str) -> Result<IdentityProfile> {
            if self.reject_profiles {
                return Err(RelayError::IdentityAcquisitionFailed(
                    "Failed to get user info: 401".to_string(),
                ));
            }
            Ok(IdentityProfile {
                id: format!("id-{}", token),
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
                picture: None,
            })
        }

        async fn remove_cached_token(&self, token: &str) {
            self.evicted.lock().unwrap().push(token.to_string());
        }

        async fn revoke(&self, token: &str) -> Result<()> {
            self.revoked.lock().unwrap().push(token.to_string());
            Err(RelayError::AllEndpointsUnreachable {
                last_error: "offline".to_string(),
            })
        }
    }

    fn refused_url() -> Url {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    fn manager(
        candidates: Vec<Url>,
        identity: Arc<dyn IdentityProvider>,
        mode: AuthMode,
    ) -> (AuthManager, TokenStore) {
        let store = TokenStore::temporary().unwrap();
        let locator =
            Arc::new(BackendLocator::new(candidates, StdDuration::from_secs(2)).unwrap());
        let manager = AuthManager::new(store.clone(), locator, identity, mode, Duration::days(30));
        (manager, store)
    }

    fn stored_session(token: &str) -> Session {
        Session::new(
            token.to_string(),
            User {
                user_id: "u1".to_string(),
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
                is_anonymous: false,
            },
            AuthMode::Production,
        )
    }

    #[test]
    fn test_local_token_shape() {
        let token = mint_local_token();
        let parts: Vec<&str> = token.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "local");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_authenticate_exchanges_with_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/chrome-extension"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "backend-token",
                "token_type": "bearer",
                "user_id": "backend-user",
                "email": "alice@example.com",
                "name": "Alice A.",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (auth, store) = manager(
            vec![Url::parse(&server.uri()).unwrap()],
            FakeIdentity::new(Some("ya29.x"), None),
            AuthMode::Production,
        );
        let user = auth.authenticate().await.unwrap();
        assert_eq!(user.user_id, "backend-user");
        assert_eq!(user.name, "Alice A.");
        assert_eq!(auth.state(), AuthState::SignedIn);
        assert_eq!(auth.access_token().as_deref(), Some("backend-token"));

        let persisted = store.load().unwrap().unwrap();
        assert_eq!(persisted.access_token, "backend-token");
        assert!(persisted.persistent_login);
    }

    #[tokio::test]
    async fn test_authenticate_degrades_to_local_token() {
        let (auth, store) = manager(
            vec![refused_url(), refused_url()],
            FakeIdentity::new(Some("ya29.x"), None),
            AuthMode::Production,
        );
        let user = auth.authenticate().await.unwrap();
        assert_eq!(user.user_id, "id-ya29.x");

        let token = auth.access_token().unwrap();
        assert!(token.starts_with("local_"));
        let persisted = store.load().unwrap().unwrap();
        assert_eq!(persisted.access_token, token);
        assert!(persisted.persistent_login);
    }

    #[tokio::test]
    async fn test_authenticate_degrades_on_backend_error_status() {
        let server = MockServer::start().await;
        Mock::given(path("/auth/chrome-extension"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (auth, _store) = manager(
            vec![Url::parse(&server.uri()).unwrap()],
            FakeIdentity::new(Some("ya29.x"), None),
            AuthMode::Production,
        );
        auth.authenticate().await.unwrap();
        assert!(auth.access_token().unwrap().starts_with("local_"));
    }

    #[tokio::test]
    async fn test_development_mode_without_backend() {
        let (auth, store) = manager(
            vec![refused_url(), refused_url()],
            Arc::new(DevelopmentIdentity),
            AuthMode::Development,
        );
        let user = auth.authenticate().await.unwrap();
        assert_eq!(user.user_id, "dev_user_123");
        assert!(auth.access_token().unwrap().starts_with("local_"));
        assert_eq!(
            store.load().unwrap().unwrap().auth_mode,
            AuthMode::Development
        );
    }

    #[tokio::test]
    async fn test_identity_failure_returns_to_signed_out() {
        let (auth, store) = manager(
            vec![refused_url()],
            FakeIdentity::new(None, None),
            AuthMode::Production,
        );
        let err = auth.authenticate().await.unwrap_err();
        assert!(matches!(err, RelayError::IdentityAcquisitionFailed(_)));
        assert_eq!(auth.state(), AuthState::SignedOut);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_refused_profile_evicts_identity_token() {
        let identity = FakeIdentity::rejecting_profiles(Some("ya29.dead"), None);
        let (auth, store) = manager(vec![refused_url()], identity.clone(), AuthMode::Production);

        let err = auth.authenticate().await.unwrap_err();
        assert!(matches!(err, RelayError::IdentityAcquisitionFailed(_)));
        assert_eq!(identity.evicted.lock().unwrap().as_slice(), ["ya29.dead"]);
        assert_eq!(auth.state(), AuthState::SignedOut);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_google_token_reacquired_after_refused_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let identity = Arc::new(
            GoogleIdentity::new(
                &format!("{}/userinfo", server.uri()),
                &format!("{}/revoke", server.uri()),
                vec!["sh".into(), "-c".into(), "date +%s%N".into()],
            )
            .unwrap(),
        );
        let (auth, _store) = manager(vec![refused_url()], identity, AuthMode::Production);

        assert!(auth.authenticate().await.is_err());
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        assert!(auth.authenticate().await.is_err());

        let tokens: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.headers.get("authorization"))
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(tokens.len(), 2);
        assert_ne!(tokens[0], tokens[1]);
    }

    #[tokio::test]
    async fn test_silent_refresh_evicts_refused_token() {
        let server = MockServer::start().await;
        Mock::given(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let identity = FakeIdentity::rejecting_profiles(None, Some("ya29.stale"));
        let (auth, store) = manager(
            vec![Url::parse(&server.uri()).unwrap()],
            identity.clone(),
            AuthMode::Production,
        );
        store.save(&stored_session("revoked")).unwrap();

        assert_eq!(auth.restore().await, AuthState::SignedOut);
        assert_eq!(identity.evicted.lock().unwrap().as_slice(), ["ya29.stale"]);
    }

    #[tokio::test]
    async fn test_try_authenticate_does_not_queue() {
        let (auth, _store) = manager(
            vec![refused_url()],
            FakeIdentity::new(Some("ya29.x"), None),
            AuthMode::Production,
        );
        let guard = auth.op_guard.lock().await;
        let err = auth.try_authenticate().await.unwrap_err();
        assert!(matches!(err, RelayError::NotAuthenticated));
        drop(guard);

        auth.try_authenticate().await.unwrap();
        assert_eq!(auth.state(), AuthState::SignedIn);
    }

    #[tokio::test]
    async fn test_restore_without_stored_session() {
        let (auth, _store) = manager(
            vec![refused_url()],
            FakeIdentity::new(None, None),
            AuthMode::Production,
        );
        assert_eq!(auth.restore().await, AuthState::SignedOut);
    }

    #[tokio::test]
    async fn test_restore_expired_session_clears_storage() {
        let server = MockServer::start().await;
        Mock::given(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (auth, store) = manager(
            vec![Url::parse(&server.uri()).unwrap()],
            FakeIdentity::new(None, None),
            AuthMode::Production,
        );
        let mut session = stored_session("old");
        session.auth_timestamp = Utc::now() - Duration::days(31);
        store.save(&session).unwrap();

        assert_eq!(auth.restore().await, AuthState::SignedOut);
        assert!(store.is_empty());
        assert!(auth.access_token().is_none());
    }

    #[tokio::test]
    async fn test_restore_non_persistent_session_is_ignored() {
        let (auth, store) = manager(
            vec![refused_url()],
            FakeIdentity::new(None, None),
            AuthMode::Production,
        );
        let mut session = stored_session("tok");
        session.persistent_login = false;
        store.save(&session).unwrap();

        assert_eq!(auth.restore().await, AuthState::SignedOut);
    }

    #[tokio::test]
    async fn test_restore_valid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (auth, store) = manager(
            vec![Url::parse(&server.uri()).unwrap()],
            FakeIdentity::new(None, None),
            AuthMode::Production,
        );
        store.save(&stored_session("good")).unwrap();

        assert_eq!(auth.restore().await, AuthState::SignedIn);
        assert_eq!(auth.access_token().as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_restore_trusts_cache_when_backend_unreachable() {
        let (auth, store) = manager(
            vec![refused_url(), refused_url()],
            FakeIdentity::new(None, None),
            AuthMode::Production,
        );
        store.save(&stored_session("cached")).unwrap();

        assert_eq!(auth.restore().await, AuthState::SignedIn);
        assert_eq!(auth.access_token().as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn test_restore_rejected_then_silent_refresh_fails() {
        let server = MockServer::start().await;
        Mock::given(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (auth, store) = manager(
            vec![Url::parse(&server.uri()).unwrap()],
            FakeIdentity::new(None, None),
            AuthMode::Production,
        );
        store.save(&stored_session("stale")).unwrap();

        assert_eq!(auth.restore().await, AuthState::SignedOut);
        assert!(store.is_empty());
        assert!(auth.current_user().is_none());
    }

    #[tokio::test]
    async fn test_restore_rejected_then_silent_refresh_succeeds() {
        let server = MockServer::start().await;
        Mock::given(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (auth, store) = manager(
            vec![Url::parse(&server.uri()).unwrap()],
            FakeIdentity::new(None, Some("ya29.fresh")),
            AuthMode::Production,
        );
        store.save(&stored_session("stale")).unwrap();
        let mut events = auth.subscribe();

        assert_eq!(auth.restore().await, AuthState::SignedIn);
        assert_eq!(auth.access_token().as_deref(), Some("ya29.fresh"));
        assert_eq!(store.load().unwrap().unwrap().access_token, "ya29.fresh");
        assert!(events.has_changed().unwrap());
        assert_eq!(events.borrow_and_update().state, AuthState::SignedIn);
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let identity = FakeIdentity::new(Some("ya29.x"), None);
        let (auth, store) = manager(
            vec![refused_url()],
            identity.clone(),
            AuthMode::Production,
        );
        auth.authenticate().await.unwrap();

        auth.logout().await;
        assert_eq!(auth.state(), AuthState::SignedOut);
        assert!(store.is_empty());
        // Revocation failed, the session is gone anyway.
        assert_eq!(identity.revoked.lock().unwrap().as_slice(), ["ya29.x"]);

        auth.logout().await;
        assert_eq!(auth.state(), AuthState::SignedOut);
        assert_eq!(identity.revoked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_authenticate_calls_are_serialized() {
        let (auth, store) = manager(
            vec![refused_url()],
            FakeIdentity::new(Some("ya29.x"), None),
            AuthMode::Production,
        );
        let auth = Arc::new(auth);
        let a = tokio::spawn({
            let auth = auth.clone();
            async move { auth.authenticate().await }
        });
        let b = tokio::spawn({
            let auth = auth.clone();
            async move { auth.authenticate().await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(auth.state(), AuthState::SignedIn);
        assert_eq!(
            store.load().unwrap().unwrap().access_token,
            auth.access_token().unwrap()
        );
    }
}

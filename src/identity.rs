//! Third-party identity: token acquisition, profile lookup and revocation.

use crate::error::{RelayError, Result};
use crate::models::IdentityProfile;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Obtain an identity access token. With `interactive` false the provider
    /// must not prompt the user.
    async fn acquire_token(&self, interactive: bool) -> Result<String>;

    async fn fetch_profile(&self, token: &str) -> Result<IdentityProfile>;

    /// Forget a cached token so the next acquisition fetches a fresh one.
    async fn remove_cached_token(&self, token: &str);

    async fn revoke(&self, token: &str) -> Result<()>;
}

// ============================================================================
// Google
// ============================================================================

/// Google OAuth identity. Tokens come from a host-configured command that
/// prints an access token on stdout; `KG_NOTES_INTERACTIVE` tells it whether
/// it may prompt.
pub struct GoogleIdentity {
    client: reqwest::Client,
    userinfo_url: String,
    revoke_url: String,
    token_command: Vec<String>,
    cached: Mutex<Option<String>>,
}

impl GoogleIdentity {
    pub fn new(userinfo_url: &str, revoke_url: &str, token_command: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RelayError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            userinfo_url: userinfo_url.to_string(),
            revoke_url: revoke_url.to_string(),
            token_command,
            cached: Mutex::new(None),
        })
    }

    fn cached_token(&self) -> Option<String> {
        self.cached.lock().ok().and_then(|c| c.clone())
    }

    async fn run_token_command(&self, interactive: bool) -> Result<String> {
        let (program, args) = self.token_command.split_first().ok_or_else(|| {
            RelayError::IdentityAcquisitionFailed("no identity command configured".to_string())
        })?;

        let output = Command::new(program)
            .args(args)
            .env("KG_NOTES_INTERACTIVE", if interactive { "1" } else { "0" })
            .output()
            .await
            .map_err(|e| {
                RelayError::IdentityAcquisitionFailed(format!("failed to run {}: {}", program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RelayError::IdentityAcquisitionFailed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(RelayError::IdentityAcquisitionFailed(
                "identity command returned empty token".to_string(),
            ));
        }
        Ok(token)
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
    async fn acquire_token(&self, interactive: bool) -> Result<String> {
        if let Some(token) = self.cached_token() {
            debug!("using cached identity token");
            return Ok(token);
        }
        let token = self.run_token_command(interactive).await?;
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(token.clone());
        }
        Ok(token)
    }

    async fn fetch_profile(&self, token: &str) -> Result<IdentityProfile> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| RelayError::IdentityAcquisitionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::IdentityAcquisitionFailed(format!(
                "Failed to get user info: {} - {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RelayError::IdentityAcquisitionFailed(e.to_string()))
    }

    async fn remove_cached_token(&self, token: &str) {
        if let Ok(mut cached) = self.cached.lock() {
            if cached.as_deref() == Some(token) {
                *cached = None;
            }
        }
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let url = format!("{}?token={}", self.revoke_url, urlencoding::encode(token));
        let response = self.client.post(&url).send().await.map_err(|e| {
            RelayError::AllEndpointsUnreachable {
                last_error: e.to_string(),
            }
        })?;
        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "token revocation rejected");
            return Err(RelayError::BackendRejected {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Development
// ============================================================================

/// Fixed development user. Never talks to an identity service.
#[derive(Default)]
pub struct DevelopmentIdentity;

impl DevelopmentIdentity {
    pub fn profile() -> IdentityProfile {
        IdentityProfile {
            id: "dev_user_123".to_string(),
            email: "developer@example.com".to_string(),
            name: "Development User".to_string(),
            picture: None,
        }
    }
}

#[async_trait]
impl IdentityProvider for DevelopmentIdentity {
    async fn acquire_token(&self, _interactive: bool) -> Result<String> {
        Ok(format!("dev_token_{}", Utc::now().timestamp_millis()))
    }

    async fn fetch_profile(&self, _token: &str) -> Result<IdentityProfile> {
        Ok(Self::profile())
    }

    async fn remove_cached_token(&self, _token: &str) {}

    async fn revoke(&self, _token: &str) -> Result<()> {
        Ok(())
    }
}

//! Relay configuration.
//!
//! Defaults come from the constants in the crate root. An optional TOML file
//! overrides them, and `KG_NOTES_*` environment variables override the file.

use crate::error::{RelayError, Result};
use crate::models::AuthMode;
use crate::{
    DB_PATH, DEFAULT_BACKEND_CANDIDATES, DEFAULT_LISTEN_ADDR, DEFAULT_REQUEST_TIMEOUT_SECS,
    GOOGLE_REVOKE_URL, GOOGLE_USERINFO_URL, SESSION_MAX_AGE_DAYS,
};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Candidate backend base URLs, in priority order.
    pub backend_candidates: Vec<String>,
    pub listen_addr: String,
    pub db_path: PathBuf,
    pub auth_mode: AuthMode,
    pub session_max_age_days: i64,
    /// Caller-side wait before a bridged request answers with a timeout.
    pub request_timeout_secs: u64,
    /// Per-attempt HTTP timeout used by the backend locator.
    pub backend_timeout_secs: u64,
    pub userinfo_url: String,
    pub revoke_url: String,
    /// Program (plus args) that prints an identity access token on stdout.
    pub identity_command: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_candidates: DEFAULT_BACKEND_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            db_path: PathBuf::from(DB_PATH),
            auth_mode: AuthMode::Production,
            session_max_age_days: SESSION_MAX_AGE_DAYS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            backend_timeout_secs: 10,
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            revoke_url: GOOGLE_REVOKE_URL.to_string(),
            identity_command: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Apply `KG_NOTES_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KG_NOTES_BACKENDS") {
            self.backend_candidates = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("KG_NOTES_LISTEN") {
            self.listen_addr = v;
        }
        if let Some(v) = lookup("KG_NOTES_DB") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("KG_NOTES_AUTH_MODE") {
            self.auth_mode = match v.to_lowercase().as_str() {
                "production" => AuthMode::Production,
                "development" => AuthMode::Development,
                other => {
                    return Err(RelayError::Config(format!("unknown auth mode: {}", other)))
                }
            };
        }
        if let Some(v) = lookup("KG_NOTES_REQUEST_TIMEOUT") {
            self.request_timeout_secs = v
                .parse()
                .map_err(|_| RelayError::Config(format!("invalid request timeout: {}", v)))?;
        }
        if let Some(v) = lookup("KG_NOTES_IDENTITY_COMMAND") {
            self.identity_command = v.split_whitespace().map(|s| s.to_string()).collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend_candidates.is_empty() {
            return Err(RelayError::Config(
                "at least one backend candidate is required".to_string(),
            ));
        }
        self.candidate_urls()?;
        if self.session_max_age_days <= 0 {
            return Err(RelayError::Config(
                "session_max_age_days must be positive".to_string(),
            ));
        }
        if chrono::Duration::try_days(self.session_max_age_days).is_none() {
            return Err(RelayError::Config(format!(
                "session_max_age_days out of range: {}",
                self.session_max_age_days
            )));
        }
        Ok(())
    }

    pub fn candidate_urls(&self) -> Result<Vec<Url>> {
        self.backend_candidates
            .iter()
            .map(|s| {
                let url = Url::parse(s)
                    .map_err(|e| RelayError::Config(format!("bad backend {}: {}", s, e)))?;
                if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                    return Err(RelayError::Config(format!(
                        "backend must be an http(s) URL with a host: {}",
                        s
                    )));
                }
                Ok(url)
            })
            .collect()
    }

    /// Saturates for values `validate` would reject.
    pub fn session_max_age(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.session_max_age_days).unwrap_or(chrono::Duration::MAX)
    }
}

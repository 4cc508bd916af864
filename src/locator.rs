//! Backend discovery across an ordered list of candidate base URLs.
//!
//! A candidate that produces any HTTP response, error statuses included, is
//! considered reachable and remembered for the next call. Only transport
//! failures (connection refused, timeouts) move on to the next candidate.

use crate::error::{RelayError, Result};
use reqwest::{Method, Response};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

// ============================================================================
// Request Options
// ============================================================================

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            bearer: None,
            body: None,
        }
    }

    pub fn post_json<T: Serialize>(body: &T) -> Result<Self> {
        Ok(Self {
            method: Method::POST,
            bearer: None,
            body: Some(serde_json::to_value(body)?),
        })
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

// ============================================================================
// Selection Strategy
// ============================================================================

/// Decides the order in which candidates are tried.
pub trait EndpointSelection: Send + Sync {
    fn order(&self, candidates: usize) -> Vec<usize>;
    fn record_success(&self, index: usize);
    fn preferred(&self) -> Option<usize>;
}

/// Try the last candidate that answered first, then the rest in priority order.
#[derive(Default)]
pub struct StickyFirstSuccess {
    active: Mutex<Option<usize>>,
}

impl EndpointSelection for StickyFirstSuccess {
    fn order(&self, candidates: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..candidates).collect();
        if let Some(active) = self.preferred().filter(|i| *i < candidates) {
            order.retain(|i| *i != active);
            order.insert(0, active);
        }
        order
    }

    fn record_success(&self, index: usize) {
        if let Ok(mut active) = self.active.lock() {
            *active = Some(index);
        }
    }

    fn preferred(&self) -> Option<usize> {
        self.active.lock().ok().and_then(|a| *a)
    }
}

/// Always walk candidates in configured order.
#[derive(Default)]
pub struct FixedOrder;

impl EndpointSelection for FixedOrder {
    fn order(&self, candidates: usize) -> Vec<usize> {
        (0..candidates).collect()
    }

    fn record_success(&self, _index: usize) {}

    fn preferred(&self) -> Option<usize> {
        None
    }
}

// ============================================================================
// Locator
// ============================================================================

pub struct BackendLocator {
    candidates: Vec<Url>,
    client: reqwest::Client,
    selection: Box<dyn EndpointSelection>,
}

impl BackendLocator {
    pub fn new(candidates: Vec<Url>, timeout: Duration) -> Result<Self> {
        Self::with_selection(candidates, timeout, Box::new(StickyFirstSuccess::default()))
    }

    pub fn with_selection(
        candidates: Vec<Url>,
        timeout: Duration,
        selection: Box<dyn EndpointSelection>,
    ) -> Result<Self> {
        if candidates.is_empty() {
            return Err(RelayError::Config("no backend candidates".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            candidates,
            client,
            selection,
        })
    }

    /// The base URL that answered most recently, if any has.
    pub fn active_base(&self) -> Option<&Url> {
        self.selection
            .preferred()
            .and_then(|i| self.candidates.get(i))
    }

    /// One pass over the candidates. Returns the first HTTP response.
    pub async fn call(&self, path: &str, options: &RequestOptions) -> Result<Response> {
        let mut last_error = String::from("no candidates tried");

        for index in self.selection.order(self.candidates.len()) {
            let url = join_path(&self.candidates[index], path);
            debug!(%url, method = %options.method, "trying backend");

            let mut request = self.client.request(options.method.clone(), &url);
            if let Some(token) = &options.bearer {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &options.body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    if self.selection.preferred() != Some(index) {
                        info!(base = %self.candidates[index], "backend endpoint selected");
                    }
                    self.selection.record_success(index);
                    return Ok(response);
                }
                Err(e) => {
                    debug!(%url, error = %e, "backend candidate failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(RelayError::AllEndpointsUnreachable { last_error })
    }
}

fn join_path(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

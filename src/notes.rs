//! Note submission and listing against the backend.
//!
//! Saving needs a Session. When there is none, one implicit sign-in is tried
//! (without queueing behind an in-flight one) before giving up with
//! `NotAuthenticated`. Save failures are returned as-is; they are never
//! downgraded to local-only storage.

use crate::auth::AuthManager;
use crate::capture::normalize_context;
use crate::error::{RelayError, Result};
use crate::locator::{BackendLocator, RequestOptions};
use crate::models::{NoteMetadata, NotePayload, PageContext};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct NoteService {
    auth: Arc<AuthManager>,
    locator: Arc<BackendLocator>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveNoteResponse {
    #[serde(alias = "note_id", alias = "id")]
    note_id: String,
}

impl NoteService {
    pub fn new(auth: Arc<AuthManager>, locator: Arc<BackendLocator>) -> Self {
        Self { auth, locator }
    }

    async fn token_or_sign_in(&self) -> Result<String> {
        if let Some(token) = self.auth.access_token() {
            return Ok(token);
        }
        info!("no session, attempting implicit authentication before save");
        self.auth.try_authenticate().await?;
        self.auth.access_token().ok_or(RelayError::NotAuthenticated)
    }

    /// Submit a note. Returns the backend-assigned note id.
    pub async fn save(&self, content: &str, context: &PageContext) -> Result<String> {
        let token = self.token_or_sign_in().await?;
        let payload = build_payload(content, context);

        let options = RequestOptions::post_json(&payload)?.bearer(&token);
        let response = self.locator.call("/notes", &options).await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = status.as_u16(), "note save rejected");
            return Err(RelayError::BackendRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let saved: SaveNoteResponse = serde_json::from_str(&text)?;
        info!(note_id = %saved.note_id, url = %context.url, "note saved");
        Ok(saved.note_id)
    }

    /// Fetch the user's notes. No implicit sign-in.
    pub async fn list(&self) -> Result<Vec<serde_json::Value>> {
        let token = self.auth.access_token().ok_or(RelayError::NotAuthenticated)?;
        let response = self
            .locator
            .call("/notes", &RequestOptions::get().bearer(&token))
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RelayError::BackendRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: serde_json::Value = serde_json::from_str(&text)?;
        let notes = extract_notes(body);
        debug!(count = notes.len(), "notes fetched");
        Ok(notes)
    }
}

/// Merge the note text with the page context into the `POST /notes` body.
pub fn build_payload(content: &str, context: &PageContext) -> NotePayload {
    let context = normalize_context(context.clone());
    let selection = if content != context.title {
        Some(content.to_string())
    } else {
        None
    };

    NotePayload {
        content: content.to_string(),
        url: context.url.clone(),
        metadata: NoteMetadata {
            title: context.title,
            url: context.url,
            domain: context.domain,
            timestamp: context.timestamp,
            summary: context.summary.filter(|s| !s.trim().is_empty()),
            selection,
            youtube: context.youtube,
        },
    }
}

/// Accepts `{notes: [...]}`, a bare array, or `{data: [...]}`.
fn extract_notes(body: serde_json::Value) -> Vec<serde_json::Value> {
    match body {
        serde_json::Value::Array(notes) => notes,
        serde_json::Value::Object(mut map) => match map.remove("notes") {
            Some(serde_json::Value::Array(notes)) => notes,
            _ => match map.remove("data") {
                Some(serde_json::Value::Array(notes)) => notes,
                _ => Vec::new(),
            },
        },
        _ => Vec::new(),
    }
}

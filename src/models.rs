//! Data models for the notes relay.
//!
//! This module contains the Session owned by the auth state machine, the page
//! context supplied by content scripts, and the typed request/response
//! contracts spoken with UI surfaces.

use chrono::{DateTime, Duration, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Production,
    Development,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Production => "production",
            AuthMode::Development => "development",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// The signed-in user's credential and profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub user: User,
    pub auth_timestamp: DateTime<Utc>,
    pub persistent_login: bool,
    pub auth_mode: AuthMode,
}

impl Session {
    pub fn new(access_token: String, user: User, auth_mode: AuthMode) -> Self {
        Self {
            access_token,
            user,
            auth_timestamp: Utc::now(),
            persistent_login: true,
            auth_mode,
        }
    }

    /// True once the session is strictly older than `max_age`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.auth_timestamp > max_age
    }

    /// Locally-minted tokens are never known to the backend.
    pub fn is_local(&self) -> bool {
        self.access_token.starts_with(LOCAL_TOKEN_PREFIX)
    }
}

pub const LOCAL_TOKEN_PREFIX: &str = "local_";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuthState {
    SignedOut,
    Authenticating,
    SignedIn,
    SilentlyRefreshing,
}

// ============================================================================
// Identity Provider Types
// ============================================================================

/// Profile returned by the identity provider's userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl IdentityProfile {
    pub fn to_user(&self) -> User {
        User {
            user_id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            is_anonymous: false,
        }
    }
}

/// Body of `POST /auth/chrome-extension`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenExchangeRequest<'a> {
    pub access_token: &'a str,
    pub user_info: &'a IdentityProfile,
}

/// Backend-issued credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

// ============================================================================
// Page Context
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub domain: String,
    /// Content scripts send epoch milliseconds; RFC 3339 strings are accepted too.
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<YoutubeContext>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        FractionalMillis(f64),
        Text(String),
    }

    let millis = match Option::<Raw>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Raw::Text(text)) => {
            return DateTime::parse_from_rfc3339(&text)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(de::Error::custom)
        }
        Some(Raw::Millis(ms)) => ms,
        Some(Raw::FractionalMillis(ms)) if ms.is_finite() => ms as i64,
        Some(Raw::FractionalMillis(ms)) => {
            return Err(de::Error::custom(format!("invalid timestamp: {}", ms)))
        }
    };
    DateTime::from_timestamp_millis(millis)
        .map(Some)
        .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", millis)))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct YoutubeContext {
    pub video_title: String,
    pub channel_name: String,
    /// Playback position in seconds.
    #[serde(default)]
    pub current_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamped_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteRequest {
    pub content: String,
    pub context: PageContext,
}

/// Body of `POST /notes`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotePayload {
    pub content: String,
    pub url: String,
    pub metadata: NoteMetadata,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NoteMetadata {
    pub title: String,
    pub url: String,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube: Option<YoutubeContext>,
}

// ============================================================================
// Message Contracts
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ContextMenuItem {
    SaveSelection,
    SavePage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextMenuClick {
    pub menu_item_id: ContextMenuItem,
    #[serde(default)]
    pub selection_text: Option<String>,
    pub context: PageContext,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuickNote {
    #[serde(default)]
    pub content: Option<String>,
    pub context: PageContext,
}

/// Every request a UI surface can send, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Authenticate,
    GetAuthStatus,
    SaveNote {
        data: NoteRequest,
    },
    GetNotes,
    Logout,
    OpenFloatingWindow {
        #[serde(default)]
        context: Option<PageContext>,
    },
    GetPendingContext,
    ContextMenu {
        data: ContextMenuClick,
    },
    QuickNote {
        data: QuickNote,
    },
    CloseCapture,
}

impl Request {
    pub const TAGS: &'static [&'static str] = &[
        "AUTHENTICATE",
        "GET_AUTH_STATUS",
        "SAVE_NOTE",
        "GET_NOTES",
        "LOGOUT",
        "OPEN_FLOATING_WINDOW",
        "GET_PENDING_CONTEXT",
        "CONTEXT_MENU",
        "QUICK_NOTE",
        "CLOSE_CAPTURE",
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Request::Authenticate => "AUTHENTICATE",
            Request::GetAuthStatus => "GET_AUTH_STATUS",
            Request::SaveNote { .. } => "SAVE_NOTE",
            Request::GetNotes => "GET_NOTES",
            Request::Logout => "LOGOUT",
            Request::OpenFloatingWindow { .. } => "OPEN_FLOATING_WINDOW",
            Request::GetPendingContext => "GET_PENDING_CONTEXT",
            Request::ContextMenu { .. } => "CONTEXT_MENU",
            Request::QuickNote { .. } => "QUICK_NOTE",
            Request::CloseCapture => "CLOSE_CAPTURE",
        }
    }
}

/// Reply sent back to a UI surface. Fields not relevant to the request are
/// omitted from the JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_authenticated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_state: Option<AuthState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<PageContext>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn from_error(err: &crate::error::RelayError) -> Self {
        Self {
            error_kind: Some(err.kind().to_string()),
            ..Self::failure(err.to_string())
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Pushed to subscribed UI surfaces over the event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayEvent {
    AuthStateChanged {
        state: AuthState,
        #[serde(default)]
        user: Option<User>,
    },
    OpenCapture {
        #[serde(default)]
        context: Option<PageContext>,
    },
    /// The page at `url` should pause its video while a note is captured.
    PauseVideo {
        url: String,
    },
    ResumeVideo {
        url: String,
    },
}

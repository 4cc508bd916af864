//! Error taxonomy for the relay.
//!
//! Every failure that can reach a UI surface is one of these variants. The
//! message router converts them into `{success: false, error}` replies, so
//! the `Display` text is what users end up seeing.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// No usable Session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Every candidate backend failed at the network level.
    #[error("All API endpoints failed. Last error: {last_error}")]
    AllEndpointsUnreachable { last_error: String },

    /// A reachable backend answered with a non-2xx status.
    #[error("Backend rejected request: {status} - {body}")]
    BackendRejected { status: u16, body: String },

    /// Consent denied, no token returned, or the profile lookup failed.
    #[error("Identity acquisition failed: {0}")]
    IdentityAcquisitionFailed(String),

    /// The caller stopped waiting. The underlying operation may still finish.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl RelayError {
    /// Short machine-readable tag, sent alongside the message on failures.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::NotAuthenticated => "NotAuthenticated",
            RelayError::AllEndpointsUnreachable { .. } => "AllEndpointsUnreachable",
            RelayError::BackendRejected { .. } => "BackendRejected",
            RelayError::IdentityAcquisitionFailed(_) => "IdentityAcquisitionFailed",
            RelayError::Timeout(_) => "Timeout",
            RelayError::Storage(_) => "Storage",
            RelayError::Decode(_) => "Decode",
            RelayError::Config(_) => "Config",
            RelayError::InvalidMessage(_) => "InvalidMessage",
        }
    }
}

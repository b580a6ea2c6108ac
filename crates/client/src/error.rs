//! Client error types.

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures reading or writing local durable storage.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The snapshot does not fit in the store's quota.
    #[error("storage quota exceeded: {size} bytes > {quota} bytes")]
    QuotaExceeded { size: usize, quota: usize },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced by the API client and its stores.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server could not be reached or the transfer failed.
    #[error("Unable to reach the server: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Api { status: StatusCode, message: String },

    /// The operation needs a logged-in session.
    #[error("Not authenticated - please log in again")]
    Unauthenticated,

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid cache pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Persist(#[from] PersistError),

    /// A failure shared by every caller of a coalesced fetch.
    #[error(transparent)]
    Shared(Arc<ClientError>),
}

impl ClientError {
    /// Status code of an API error, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            Self::Shared(inner) => inner.status(),
            _ => None,
        }
    }

    /// Recover the original error if this caller is its only holder.
    pub(crate) fn from_shared(err: Arc<Self>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(Self::Shared)
    }
}

/// Fallback message for an error status without a server-provided message.
pub(crate) fn default_message(status: StatusCode) -> &'static str {
    match status {
        StatusCode::UNAUTHORIZED => "Not authorized - please log in again",
        StatusCode::NOT_FOUND => "Product not found",
        StatusCode::INTERNAL_SERVER_ERROR => "Server error, please try again",
        _ => "Failed to load products",
    }
}

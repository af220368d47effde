//! Error types for credential storage and acquisition.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for token store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for credential acquisition.
pub type AuthResult<T> = Result<T, AuthError>;

/// Token store failures.
///
/// Unreadable or corrupt records are not errors: `load` reports them as
/// absent. Only caller mistakes and write failures end up here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user id {raw:?} contains no characters usable as a storage key")]
    InvalidUserId { raw: String },

    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize credential record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("token store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

/// Failures talking to the OAuth authority or running the local grant.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} rejected the request ({status}): {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("OAuth state mismatch in authorization callback")]
    StateMismatch,

    #[error("no authorization callback received within {}s", .0.as_secs())]
    CallbackTimeout(Duration),

    #[error("callback listener on {addr} failed: {source}")]
    Listener {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// A refresh attempt that did not produce a usable record.
///
/// Always absorbed by the credential manager, which falls back to a new grant.
#[derive(Debug, Error)]
#[error("token refresh failed: {cause}")]
pub struct RefreshFailed {
    #[source]
    pub cause: OAuthError,
}

impl RefreshFailed {
    /// True when the authority refused the refresh token itself.
    pub fn is_revoked(&self) -> bool {
        matches!(
            self.cause,
            OAuthError::Rejected {
                status: 400 | 401,
                ..
            }
        )
    }
}

impl From<OAuthError> for RefreshFailed {
    fn from(cause: OAuthError) -> Self {
        Self { cause }
    }
}

/// Credential acquisition failures surfaced to callers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Headless acquisition found nothing usable.
    #[error("no valid credentials for user '{user_id}'")]
    NoValidToken { user_id: String },

    #[error("authorization for user '{user_id}' failed: {cause}")]
    FlowFailed {
        user_id: String,
        #[source]
        cause: OAuthError,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

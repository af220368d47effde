//! Server error types.

use gcal_mcp_auth::{AuthError, OAuthError, StoreError};
use gcal_mcp_core::ConfigError;
use thiserror::Error;

/// Result type for commands.
pub type AppResult<T> = Result<T, AppError>;

/// Errors that end a `gcal-mcp` command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Headless startup found no usable credentials.
    #[error("{0}; run `gcal-mcp auth` to authorize")]
    AuthRequired(#[source] AuthError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("MCP transport error: {0}")]
    Transport(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Auth(AuthError::Storage(err))
    }
}

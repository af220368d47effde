//! Calendar API error normalization.

use serde::Deserialize;
use thiserror::Error;

/// Result type for calendar calls.
pub type CalendarResult<T> = Result<T, CalendarApiError>;

/// A failed calendar call.
///
/// `message` is the full description, meant for logs. Callers outside the
/// process should only see [`CalendarApiError::client_message`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CalendarApiError {
    pub message: String,
    /// HTTP status, when the API answered.
    pub status: Option<u16>,
    #[source]
    source: Option<reqwest::Error>,
}

impl CalendarApiError {
    /// The request never produced an HTTP response.
    pub(crate) fn transport(action: &str, source: reqwest::Error) -> Self {
        let kind = if source.is_timeout() {
            "timed out"
        } else if source.is_connect() {
            "could not connect"
        } else {
            "failed"
        };
        Self {
            message: format!("{} {}: {}", action, kind, source),
            status: None,
            source: Some(source),
        }
    }

    /// The API answered with a non-success status.
    pub(crate) fn status(action: &str, status: u16, body: &str) -> Self {
        Self {
            message: format!("{} returned {}: {}", action, status, api_error_message(body)),
            status: Some(status),
            source: None,
        }
    }

    /// The API answered, but not with what we expected.
    pub(crate) fn invalid_response(action: &str, detail: impl std::fmt::Display) -> Self {
        Self {
            message: format!("{} returned an unreadable response: {}", action, detail),
            status: None,
            source: None,
        }
    }

    pub(crate) fn encode(action: &str, source: serde_json::Error) -> Self {
        Self {
            message: format!("failed to encode {} request: {}", action, source),
            status: None,
            source: None,
        }
    }

    /// The API refused the access token.
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    /// Status-only description safe to hand to callers.
    pub fn client_message(&self) -> String {
        match self.status {
            Some(status) => format!("Calendar API error ({})", status),
            None => "Calendar API request failed".to_string(),
        }
    }
}

/// Pulls `error.message` out of a Google API error body.
fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: Detail,
    }
    #[derive(Deserialize)]
    struct Detail {
        message: String,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.chars().take(200).collect(),
    }
}

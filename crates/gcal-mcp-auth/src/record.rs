//! Persisted credential records and live credentials.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use gcal_mcp_core::ClientCredentials;
use serde::{Deserialize, Serialize};

/// Google's token endpoint, used when a record does not name one.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Access tokens are treated as expired this long before the authority says so.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_endpoint() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// The secret state persisted for one user.
///
/// The client id and secret are deliberately absent: a record is only usable
/// together with the live client configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default, alias = "token", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default = "default_token_endpoint", alias = "token_uri")]
    pub token_endpoint: String,

    #[serde(default)]
    pub scopes: Vec<String>,

    /// `None` means the access token does not expire.
    #[serde(default, alias = "expiry", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            token_endpoint: default_token_endpoint(),
            scopes: Vec::new(),
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    /// Sets the expiry from an `expires_in` value, minus the safety margin.
    #[must_use]
    pub fn expiring_in(mut self, expires_in_secs: Option<i64>) -> Self {
        self.expires_at = expires_in_secs.map(expiry_from_now);
        self
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Returns the requested scopes this record was not granted.
    pub fn missing_scopes<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|scope| !self.scopes.contains(scope))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("CredentialRecord")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("token_endpoint", &self.token_endpoint)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub(crate) fn expiry_from_now(expires_in_secs: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(expires_in_secs) - Duration::seconds(EXPIRY_MARGIN_SECS)
}

/// A record joined with the live client configuration.
#[derive(Debug, Clone)]
pub struct Credentials {
    record: CredentialRecord,
    client: ClientCredentials,
}

impl Credentials {
    pub fn new(record: CredentialRecord, client: ClientCredentials) -> Self {
        Self { record, client }
    }

    /// An access token is present and not expired.
    pub fn is_valid(&self) -> bool {
        self.record.has_access_token() && !self.record.is_expired()
    }

    /// Not valid, but holds a refresh token.
    pub fn is_refreshable(&self) -> bool {
        !self.is_valid() && self.record.has_refresh_token()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.record.access_token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.record.expires_at
    }

    pub fn record(&self) -> &CredentialRecord {
        &self.record
    }

    pub fn client(&self) -> &ClientCredentials {
        &self.client
    }
}

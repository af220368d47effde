//! Calendar client factory.
//!
//! A [`CalendarSession`] is built once per process and shared by the tool
//! layer. It keeps the current credentials and the client built from them,
//! and re-obtains credentials headlessly once they expire or the API rejects
//! them. A tool call never starts a browser authorization.

use std::sync::Arc;
use std::time::Duration;

use gcal_mcp_auth::{AcquireMode, AuthError, CredentialManager, Credentials};
use gcal_mcp_calendar::{CALENDAR_API_BASE, CalendarClient};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AppResult;

struct Active {
    credentials: Credentials,
    client: CalendarClient,
}

pub struct CalendarSession {
    manager: Arc<CredentialManager>,
    user_id: String,
    http: reqwest::Client,
    api_base: String,
    current: Mutex<Option<Active>>,
}

impl CalendarSession {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(
        manager: Arc<CredentialManager>,
        user_id: impl Into<String>,
        request_timeout: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_http_client(manager, user_id, http))
    }

    pub fn with_http_client(
        manager: Arc<CredentialManager>,
        user_id: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            manager,
            user_id: user_id.into(),
            http,
            api_base: CALENDAR_API_BASE.to_string(),
            current: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Seeds the session with credentials obtained at startup.
    #[must_use]
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        let active = self.activate(credentials);
        Self {
            current: Mutex::new(active),
            ..self
        }
    }

    /// A client holding a currently valid access token.
    pub async fn client(&self) -> Result<CalendarClient, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(active) = current.as_ref()
            && active.credentials.is_valid()
        {
            return Ok(active.client.clone());
        }

        debug!(user = %self.user_id, "session credentials missing or expired");
        let credentials = self
            .manager
            .obtain(&self.user_id, AcquireMode::Headless)
            .await?;
        let active = self.activate(credentials).ok_or_else(|| AuthError::NoValidToken {
            user_id: self.user_id.clone(),
        })?;
        let client = active.client.clone();
        *current = Some(active);
        Ok(client)
    }

    /// A client to retry with after the API answered 401 to `rejected`.
    pub async fn reauthorize(&self, rejected: &CalendarClient) -> Result<CalendarClient, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(active) = current.as_ref()
            && active.client.access_token() != rejected.access_token()
            && active.credentials.is_valid()
        {
            return Ok(active.client.clone());
        }
        *current = None;

        debug!(user = %self.user_id, "access token rejected, refreshing");
        let credentials = self
            .manager
            .recover(&self.user_id, rejected.access_token())
            .await?;
        let active = self.activate(credentials).ok_or_else(|| AuthError::NoValidToken {
            user_id: self.user_id.clone(),
        })?;
        let client = active.client.clone();
        *current = Some(active);
        Ok(client)
    }

    fn activate(&self, credentials: Credentials) -> Option<Active> {
        let token = credentials.access_token()?.to_string();
        let client =
            CalendarClient::with_http_client(self.http.clone(), token).with_base_url(&self.api_base);
        Some(Active {
            credentials,
            client,
        })
    }
}

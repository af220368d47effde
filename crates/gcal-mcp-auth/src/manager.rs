//! Credential acquisition.
//!
//! [`CredentialManager::obtain`] follows a fixed order:
//!
//! 1. load the stored record
//! 2. return it untouched if it is valid
//! 3. if it carries a refresh token, refresh and persist; a failed refresh is
//!    logged and falls through
//! 4. headless callers get [`AuthError::NoValidToken`]; interactive callers
//!    run a new grant, which is persisted
//!
//! Acquisitions for the same user are serialized, so concurrent callers with
//! an expired record trigger a single refresh.
//!
//! [`CredentialManager::recover`] covers access tokens the API rejects before
//! their recorded expiry, including records that carry no expiry at all.
//!
//! Store calls may block on a file lock held by another process, so they run
//! on the blocking pool.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use gcal_mcp_core::ClientCredentials;
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthResult, OAuthError, RefreshFailed, StoreError, StoreResult};
use crate::oauth::OAuthClient;
use crate::record::{CredentialRecord, Credentials};
use crate::store::{TokenStore, sanitize_user_id};

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whether acquisition may involve the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// A browser-based grant may run.
    Interactive,
    /// Only stored or refreshed credentials are acceptable.
    Headless,
}

/// The network side of acquisition.
pub trait AuthorizationFlow: Send + Sync {
    /// Exchanges the record's refresh token for a new record.
    fn refresh<'a>(
        &'a self,
        client: &'a ClientCredentials,
        record: &'a CredentialRecord,
    ) -> BoxFuture<'a, Result<CredentialRecord, RefreshFailed>>;

    /// Runs a full interactive grant.
    fn authorize<'a>(
        &'a self,
        client: &'a ClientCredentials,
        scopes: &'a [String],
    ) -> BoxFuture<'a, Result<CredentialRecord, OAuthError>>;
}

impl AuthorizationFlow for OAuthClient {
    fn refresh<'a>(
        &'a self,
        client: &'a ClientCredentials,
        record: &'a CredentialRecord,
    ) -> BoxFuture<'a, Result<CredentialRecord, RefreshFailed>> {
        Box::pin(OAuthClient::refresh(self, client, record))
    }

    fn authorize<'a>(
        &'a self,
        client: &'a ClientCredentials,
        scopes: &'a [String],
    ) -> BoxFuture<'a, Result<CredentialRecord, OAuthError>> {
        Box::pin(OAuthClient::authorize(self, client, scopes))
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Produces valid credentials for a user, refreshing or re-granting as needed.
pub struct CredentialManager {
    client: ClientCredentials,
    scopes: Vec<String>,
    store: Arc<dyn TokenStore>,
    flow: Arc<dyn AuthorizationFlow>,
    gates: Mutex<HashMap<String, Gate>>,
}

impl CredentialManager {
    pub fn new(
        client: ClientCredentials,
        scopes: Vec<String>,
        store: Arc<dyn TokenStore>,
        flow: Arc<dyn AuthorizationFlow>,
    ) -> Self {
        Self {
            client,
            scopes,
            store,
            flow,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Scopes requested for new grants.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns usable credentials for `user_id`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Storage`] for an invalid user id or a failed write
    /// - [`AuthError::NoValidToken`] in headless mode when nothing is usable
    /// - [`AuthError::FlowFailed`] when the interactive grant fails
    pub async fn obtain(&self, user_id: &str, mode: AcquireMode) -> AuthResult<Credentials> {
        let key = sanitize_user_id(user_id)?;
        let gate = self.gate(&key);
        let _turn = gate.lock().await;

        if let Some(record) = self.load(&key).await? {
            let stored = Credentials::new(record, self.client.clone());
            if stored.is_valid() {
                debug!(user = %key, "using stored credentials");
                return Ok(stored);
            }

            if stored.is_refreshable() {
                if let Some(refreshed) = self.refresh(&key, &stored).await? {
                    return Ok(refreshed);
                }
            } else {
                debug!(user = %key, "stored credentials expired without a refresh token");
            }
        }

        match mode {
            AcquireMode::Headless => Err(AuthError::NoValidToken { user_id: key }),
            AcquireMode::Interactive => self.grant(&key).await,
        }
    }

    /// Replaces an access token the API rejected, without user interaction.
    ///
    /// If the stored record already holds a different valid token, it is
    /// returned as is. Otherwise the stored refresh token is used whatever the
    /// recorded expiry says.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Storage`] for an invalid user id or a failed write
    /// - [`AuthError::NoValidToken`] when nothing stored can be refreshed
    pub async fn recover(&self, user_id: &str, rejected_token: &str) -> AuthResult<Credentials> {
        let key = sanitize_user_id(user_id)?;
        let gate = self.gate(&key);
        let _turn = gate.lock().await;

        if let Some(record) = self.load(&key).await? {
            let stored = Credentials::new(record, self.client.clone());
            if stored.is_valid() && stored.access_token() != Some(rejected_token) {
                debug!(user = %key, "stored credentials were already replaced");
                return Ok(stored);
            }
            if stored.record().has_refresh_token() {
                if let Some(refreshed) = self.refresh(&key, &stored).await? {
                    return Ok(refreshed);
                }
            } else {
                debug!(user = %key, "rejected credentials have no refresh token");
            }
        }

        Err(AuthError::NoValidToken { user_id: key })
    }

    /// Runs a new grant regardless of what is stored.
    pub async fn authorize(&self, user_id: &str) -> AuthResult<Credentials> {
        let key = sanitize_user_id(user_id)?;
        let gate = self.gate(&key);
        let _turn = gate.lock().await;
        self.grant(&key).await
    }

    /// The stored record, without validation or refresh.
    pub fn stored(&self, user_id: &str) -> AuthResult<Option<CredentialRecord>> {
        Ok(self.store.load(user_id)?)
    }

    /// Deletes the stored record.
    pub async fn forget(&self, user_id: &str) -> AuthResult<()> {
        let key = sanitize_user_id(user_id)?;
        let gate = self.gate(&key);
        let _turn = gate.lock().await;
        let store = Arc::clone(&self.store);
        let owned = key.clone();
        blocking(move || store.delete(&owned)).await?;
        info!(user = %key, "removed stored credentials");
        Ok(())
    }

    async fn grant(&self, key: &str) -> AuthResult<Credentials> {
        info!(user = %key, "starting interactive authorization");
        let record = self
            .flow
            .authorize(&self.client, &self.scopes)
            .await
            .map_err(|cause| AuthError::FlowFailed {
                user_id: key.to_string(),
                cause,
            })?;
        self.save(key, &record).await?;
        info!(user = %key, "authorization complete");
        Ok(Credentials::new(record, self.client.clone()))
    }

    /// Refreshes and persists; `None` when the authority did not cooperate.
    async fn refresh(&self, key: &str, stored: &Credentials) -> AuthResult<Option<Credentials>> {
        match self.flow.refresh(&self.client, stored.record()).await {
            Ok(refreshed) => {
                self.save(key, &refreshed).await?;
                info!(user = %key, "refreshed stored credentials");
                Ok(Some(Credentials::new(refreshed, self.client.clone())))
            }
            Err(e) if e.is_revoked() => {
                warn!(user = %key, "refresh token rejected: {}", e);
                Ok(None)
            }
            Err(e) => {
                warn!(user = %key, "token refresh failed: {}", e);
                Ok(None)
            }
        }
    }

    async fn load(&self, key: &str) -> AuthResult<Option<CredentialRecord>> {
        let store = Arc::clone(&self.store);
        let key = key.to_string();
        blocking(move || store.load(&key)).await
    }

    async fn save(&self, key: &str, record: &CredentialRecord) -> AuthResult<()> {
        let store = Arc::clone(&self.store);
        let key = key.to_string();
        let record = record.clone();
        blocking(move || store.save(&key, &record)).await
    }

    fn gate(&self, key: &str) -> Gate {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates.entry(key.to_string()).or_default().clone()
    }
}

async fn blocking<T, F>(op: F) -> AuthResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(op).await.map_err(StoreError::from)??)
}

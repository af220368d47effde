//! OAuth credential lifecycle and token persistence
//!
//! [`CredentialManager`] decides, per request, whether stored credentials can
//! be used as-is, refreshed, or must be re-acquired through an interactive
//! grant. Records are persisted through a [`TokenStore`].

pub mod error;
pub mod manager;
pub mod oauth;
pub mod record;
pub mod store;

pub use error::{AuthError, AuthResult, OAuthError, RefreshFailed, StoreError, StoreResult};
pub use manager::{AcquireMode, AuthorizationFlow, BoxFuture, CredentialManager};
pub use oauth::{OAuthClient, Pkce};
pub use record::{Credentials, CredentialRecord, GOOGLE_TOKEN_URL};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, sanitize_user_id};

//! Credential record persistence.
//!
//! A [`TokenStore`] maps a user id to at most one [`CredentialRecord`]. It has
//! no OAuth semantics: deciding whether a record is usable is the credential
//! manager's job.

mod file;
mod lock;
mod memory;

pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;

use crate::error::{StoreError, StoreResult};
use crate::record::CredentialRecord;

/// Keyed storage for credential records.
pub trait TokenStore: Send + Sync {
    /// Returns the stored record, or `None` when there is none.
    ///
    /// Storage that exists but cannot be read or parsed is also `None`.
    fn load(&self, user_id: &str) -> StoreResult<Option<CredentialRecord>>;

    /// Replaces the record for `user_id`.
    fn save(&self, user_id: &str, record: &CredentialRecord) -> StoreResult<()>;

    /// Removes the record for `user_id`. Removing nothing is not an error.
    fn delete(&self, user_id: &str) -> StoreResult<()>;
}

/// Reduces a user id to ASCII alphanumerics, `-` and `_`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidUserId`] when nothing is left.
pub fn sanitize_user_id(user_id: &str) -> StoreResult<String> {
    let key: String = user_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if key.is_empty() {
        return Err(StoreError::InvalidUserId {
            raw: user_id.to_string(),
        });
    }
    Ok(key)
}

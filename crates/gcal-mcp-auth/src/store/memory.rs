use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{TokenStore, sanitize_user_id};
use crate::error::StoreResult;
use crate::record::CredentialRecord;

/// In-process store. Nothing survives the process.
///
/// Counts writes, which makes it convenient for checking that a code path did
/// or did not persist anything.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: Mutex<HashMap<String, CredentialRecord>>,
    saves: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `record` stored under `user_id`. Not counted as a save.
    pub fn with_record(user_id: &str, record: CredentialRecord) -> StoreResult<Self> {
        let store = Self::new();
        let key = sanitize_user_id(user_id)?;
        store.lock().insert(key, record);
        Ok(store)
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CredentialRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, user_id: &str) -> StoreResult<Option<CredentialRecord>> {
        let key = sanitize_user_id(user_id)?;
        Ok(self.lock().get(&key).cloned())
    }

    fn save(&self, user_id: &str, record: &CredentialRecord) -> StoreResult<()> {
        let key = sanitize_user_id(user_id)?;
        self.lock().insert(key, record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, user_id: &str) -> StoreResult<()> {
        let key = sanitize_user_id(user_id)?;
        self.lock().remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_contract_as_file_store() {
        let store = MemoryTokenStore::new();
        let record = CredentialRecord::new("a", Some("r".into()));

        assert!(store.load("u").unwrap().is_none());
        store.save("u", &record).unwrap();
        assert_eq!(store.load("u").unwrap(), Some(record));
        assert_eq!(store.save_count(), 1);

        store.delete("u").unwrap();
        store.delete("u").unwrap();
        assert!(store.load("u").unwrap().is_none());
        assert!(store.save("///", &CredentialRecord::new("a", None)).is_err());
    }

    #[test]
    fn keys_are_sanitized() {
        let store = MemoryTokenStore::with_record("a/b", CredentialRecord::new("t", None)).unwrap();
        assert!(store.load("ab").unwrap().is_some());
        assert_eq!(store.save_count(), 0);
    }
}

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::lock::FileLock;
use super::{TokenStore, sanitize_user_id};
use crate::error::{StoreError, StoreResult};
use crate::record::CredentialRecord;

/// Stores one JSON file per user under a directory.
///
/// For a sanitized key `k` the directory holds:
///
/// - `k.token.json`, the record, mode `0600`
/// - `k.token.lock`, locked shared by readers and exclusively by writers
/// - `k.token.json.tmp`, present only while a save is in progress
///
/// Saves write the temporary file, sync it and rename it over the record, so
/// readers see either the previous record or the new one.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    dir: PathBuf,
}

struct KeyPaths {
    record: PathBuf,
    lock: PathBuf,
    tmp: PathBuf,
}

impl KeyPaths {
    fn new(dir: &Path, key: &str) -> Self {
        Self {
            record: dir.join(format!("{}.token.json", key)),
            lock: dir.join(format!("{}.token.lock", key)),
            tmp: dir.join(format!("{}.token.json.tmp", key)),
        }
    }
}

impl FileTokenStore {
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record file for `user_id`.
    pub fn record_path(&self, user_id: &str) -> StoreResult<PathBuf> {
        let key = sanitize_user_id(user_id)?;
        Ok(KeyPaths::new(&self.dir, &key).record)
    }

    fn ensure_dir(&self) -> StoreResult<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(StoreError::io("create", &self.dir))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))
                .map_err(StoreError::io("set permissions on", &self.dir))?;
        }
        debug!("created token store directory {}", self.dir.display());
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, user_id: &str) -> StoreResult<Option<CredentialRecord>> {
        let key = sanitize_user_id(user_id)?;
        let paths = KeyPaths::new(&self.dir, &key);

        if !paths.record.exists() {
            debug!(user = %key, "no stored credentials");
            return Ok(None);
        }

        let _guard = match FileLock::shared(&paths.lock) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(user = %key, "reading {} without lock: {}", paths.record.display(), e);
                None
            }
        };

        let content = match fs::read_to_string(&paths.record) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(user = %key, "failed to read {}: {}", paths.record.display(), e);
                return Ok(None);
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => {
                debug!(user = %key, "loaded stored credentials");
                Ok(Some(record))
            }
            Err(e) => {
                warn!(user = %key, "ignoring corrupt {}: {}", paths.record.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, user_id: &str, record: &CredentialRecord) -> StoreResult<()> {
        let key = sanitize_user_id(user_id)?;
        let content = serde_json::to_vec_pretty(record)?;

        self.ensure_dir()?;
        let paths = KeyPaths::new(&self.dir, &key);
        let _guard = FileLock::exclusive(&paths.lock).map_err(StoreError::io("lock", &paths.lock))?;

        write_private(&paths.tmp, &content).map_err(StoreError::io("write", &paths.tmp))?;
        if let Err(e) = fs::rename(&paths.tmp, &paths.record) {
            let _ = fs::remove_file(&paths.tmp);
            return Err(StoreError::io("replace", &paths.record)(e));
        }

        debug!(user = %key, "saved credentials to {}", paths.record.display());
        Ok(())
    }

    fn delete(&self, user_id: &str) -> StoreResult<()> {
        let key = sanitize_user_id(user_id)?;
        if !self.dir.is_dir() {
            return Ok(());
        }

        let paths = KeyPaths::new(&self.dir, &key);
        let _guard = FileLock::exclusive(&paths.lock).map_err(StoreError::io("lock", &paths.lock))?;

        match fs::remove_file(&paths.record) {
            Ok(()) => {
                debug!(user = %key, "deleted stored credentials");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io("remove", &paths.record)(e)),
        }
    }
}

/// Writes `content` to `path` with owner-only permissions and syncs it.
fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // A leftover temp file keeps its old mode; reset it.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(content)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CredentialRecord {
        CredentialRecord::new("ya29.access", Some("1//refresh".into()))
            .with_scopes(vec!["https://www.googleapis.com/auth/calendar".into()])
            .expiring_in(Some(3600))
    }

    #[test]
    fn file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path());
        store.save("default", &sample()).unwrap();

        assert!(dir.path().join("default.token.json").is_file());
        assert!(dir.path().join("default.token.lock").is_file());
        assert!(!dir.path().join("default.token.json.tmp").exists());
        assert_eq!(
            store.record_path("default").unwrap(),
            dir.path().join("default.token.json")
        );
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileTokenStore::new(&nested);
        store.save("u", &sample()).unwrap();
        assert!(nested.join("u.token.json").is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&nested).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn load_from_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent"));
        assert!(store.load("default").unwrap().is_none());
        assert!(!dir.path().join("absent").exists());
    }

    #[test]
    fn delete_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent"));
        store.delete("default").unwrap();
    }

    #[test]
    fn stale_temp_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path());
        let tmp = dir.path().join("u.token.json.tmp");
        fs::write(&tmp, "leftover from an interrupted save ".repeat(50)).unwrap();

        let record = sample();
        store.save("u", &record).unwrap();
        assert_eq!(store.load("u").unwrap(), Some(record));
        assert!(!tmp.exists());
    }
}

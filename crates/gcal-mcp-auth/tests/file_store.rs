use std::fs;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use gcal_mcp_auth::{CredentialRecord, FileTokenStore, StoreError, TokenStore};

fn record(access: &str, refresh: Option<&str>) -> CredentialRecord {
    let mut record = CredentialRecord::new(access, refresh.map(str::to_string))
        .with_scopes(vec!["https://www.googleapis.com/auth/calendar".into()]);
    record.expires_at = Some(Utc::now() + Duration::hours(1));
    record
}

#[test]
fn round_trip_preserves_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path());
    let saved = record("ya29.a", Some("1//r"));

    store.save("default", &saved).unwrap();
    let loaded = store.load("default").unwrap().unwrap();

    assert_eq!(loaded, saved);
    assert_eq!(loaded.token_endpoint, "https://oauth2.googleapis.com/token");
}

#[test]
fn save_overwrites_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path());

    store.save("default", &record("old", Some("r"))).unwrap();
    store.save("default", &record("new", Some("r"))).unwrap();

    let loaded = store.load("default").unwrap().unwrap();
    assert_eq!(loaded.access_token.as_deref(), Some("new"));
    let files: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.ends_with(".json"))
        .collect();
    assert_eq!(files, vec!["default.token.json".to_string()]);
}

#[test]
fn delete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path());

    store.save("default", &record("a", None)).unwrap();
    store.delete("default").unwrap();
    store.delete("default").unwrap();
    assert!(store.load("default").unwrap().is_none());

    // never saved
    store.delete("someone-else").unwrap();
}

#[test]
fn users_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path());

    store.save("alice", &record("alice-token", None)).unwrap();
    store.save("bob", &record("bob-token", None)).unwrap();
    store.delete("alice").unwrap();

    assert!(store.load("alice").unwrap().is_none());
    assert_eq!(
        store.load("bob").unwrap().unwrap().access_token.as_deref(),
        Some("bob-token")
    );
}

#[test]
fn corrupt_record_reads_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path());

    fs::write(dir.path().join("default.token.json"), "{\"access_token\": ").unwrap();
    assert!(store.load("default").unwrap().is_none());

    fs::write(dir.path().join("default.token.json"), "[1, 2, 3]").unwrap();
    assert!(store.load("default").unwrap().is_none());

    // a fresh save recovers
    store.save("default", &record("a", None)).unwrap();
    assert!(store.load("default").unwrap().is_some());
}

#[test]
fn invalid_user_id_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("store");
    let store = FileTokenStore::new(&root);

    for bad in ["", "../..", "///", "@"] {
        assert!(matches!(
            store.save(bad, &record("a", None)),
            Err(StoreError::InvalidUserId { .. })
        ));
        assert!(matches!(store.load(bad), Err(StoreError::InvalidUserId { .. })));
        assert!(matches!(store.delete(bad), Err(StoreError::InvalidUserId { .. })));
    }
    assert!(!root.exists());
}

#[test]
fn traversal_stays_inside_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("store");
    let store = FileTokenStore::new(&root);

    store.save("../../escape", &record("a", None)).unwrap();

    assert!(root.join("escape.token.json").is_file());
    assert!(!dir.path().join("escape.token.json").exists());
    assert!(store.load("escape").unwrap().is_some());
}

#[cfg(unix)]
#[test]
fn record_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path());
    store.save("default", &record("a", Some("r"))).unwrap();

    let mode = fs::metadata(dir.path().join("default.token.json"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn concurrent_saves_leave_one_complete_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path()));

    let writers: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 0..10 {
                    let token = format!("token-{}-{}", i, round);
                    store.save("shared", &record(&token, Some("r"))).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let loaded = store.load("shared").unwrap().unwrap();
    assert!(loaded.access_token.unwrap().starts_with("token-"));
    assert!(!dir.path().join("shared.token.json.tmp").exists());
}

#[test]
fn readers_never_see_partial_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path()));
    store.save("shared", &record("initial", Some("r"))).unwrap();

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..200 {
                // vary the length so a torn write would be visible
                let token = "x".repeat(10 + (i % 50) * 20);
                store.save("shared", &record(&token, Some("r"))).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..200 {
                    let loaded = store.load("shared").unwrap();
                    assert!(loaded.is_some(), "reader saw a missing or corrupt record");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

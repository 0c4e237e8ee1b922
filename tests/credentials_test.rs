//! Credential persistence across simulated process restarts.

use castlane::credentials::{keys, CurrentCreds, SavedCreds, UiCreds};
use castlane::{
    CredentialField, CredentialSet, CredentialSource, CredentialStore, FileStore, KeyValueStore,
    MemoryStore, SourceType,
};
use std::sync::Arc;
use tempfile::tempdir;

fn filled_set() -> CredentialSet {
    CredentialSet {
        account_id: "acct-42".to_string(),
        pub_stream_name: "studio-a".to_string(),
        sub_stream_name: "studio-b".to_string(),
        pub_token: "pub-secret-token".to_string(),
        sub_token: "sub-secret-token".to_string(),
        pub_api_url: "https://example.net/publish".to_string(),
        sub_api_url: "https://example.net/subscribe".to_string(),
    }
}

#[test]
fn test_saved_credentials_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.toml");
    let written = filled_set();

    {
        let store = Arc::new(FileStore::open(&path).unwrap());
        let credentials = CredentialStore::new(CredentialSet::default(), store);
        let edits = UiCreds::new();
        for field in CredentialField::ALL {
            edits.set(field, written.get(field));
        }
        credentials.apply(&edits, true).unwrap();
    }

    // A fresh store reads the file back, as after a restart.
    let reopened: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&path).unwrap());
    let credentials = CredentialStore::new(CredentialSet::default(), reopened.clone());
    let saved = CredentialSet::from_source(&credentials.saved_source());
    assert_eq!(saved, written);
    assert_eq!(credentials.applied(), written);
    assert_eq!(
        reopened.get_string(keys::PUBLISH_TOKEN).as_deref(),
        Some("pub-secret-token")
    );
}

#[test]
fn test_apply_without_save_leaves_store_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.toml");
    let store = Arc::new(FileStore::open(&path).unwrap());
    let credentials = CredentialStore::new(CredentialSet::default(), store);

    let edits = UiCreds::from_source(&credentials.current_source());
    edits.set(CredentialField::AccountId, "transient");
    credentials.apply(&edits, false).unwrap();

    assert_eq!(credentials.applied().account_id, "transient");
    assert!(!path.exists());

    let reopened = Arc::new(FileStore::open(&path).unwrap());
    let after_restart = CredentialStore::new(CredentialSet::default(), reopened);
    assert_eq!(after_restart.applied(), CredentialSet::default());
}

#[test]
fn test_saved_source_falls_back_per_field() {
    let store = Arc::new(MemoryStore::new());
    store
        .set_value(keys::ACCOUNT_ID, "only-this".into())
        .unwrap();
    let defaults = filled_set();
    let credentials = CredentialStore::new(defaults.clone(), store);

    let saved = CredentialSet::from_source(&credentials.saved_source());
    assert_eq!(saved.account_id, "only-this");
    assert_eq!(saved.pub_token, defaults.pub_token);
    assert_eq!(saved.sub_api_url, defaults.sub_api_url);
}

#[test]
fn test_sources_report_their_flavour() {
    let credentials = CredentialStore::new(filled_set(), Arc::new(MemoryStore::new()));
    for source_type in [
        SourceType::Default,
        SourceType::Saved,
        SourceType::Current,
        SourceType::Ui,
    ] {
        assert_eq!(credentials.source(source_type).source_type(), source_type);
    }
}

#[test]
fn test_current_source_tracks_applied_set() {
    let credentials = CredentialStore::new(CredentialSet::default(), Arc::new(MemoryStore::new()));
    let current: CurrentCreds = credentials.current_source();
    assert_eq!(current.pub_stream_name(), "castlane");

    let saved: SavedCreds = credentials.saved_source();
    let edits = UiCreds::from_source(&saved);
    edits.set(CredentialField::PubStreamName, "renamed");
    credentials.apply(&edits, false).unwrap();

    assert_eq!(current.pub_stream_name(), "renamed");
}

#[test]
fn test_validation_follows_connection_side() {
    let mut set = CredentialSet::default();
    assert!(set.validate_for_publish().is_err());
    assert!(set.validate_for_subscribe().is_err());

    set.pub_token = "token".to_string();
    assert!(set.validate_for_publish().is_ok());

    set.account_id = "acct".to_string();
    assert!(set.validate_for_subscribe().is_ok());
}

#[test]
fn test_summary_masks_tokens() {
    let summary = filled_set().summary();
    assert!(!summary.contains("pub-secret-token"));
    assert!(!summary.contains("sub-secret-token"));
    assert!(summary.contains("acct-42"));
}

//! Key-value persistence and the applied credential set.

use super::{
    CredentialField, CredentialSet, CredentialSource, CurrentCreds, DefaultCreds, SavedCreds,
    SourceType, UiCreds,
};
use crate::errors::SessionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// A value held by a [`KeyValueStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Int(i64),
    Str(String),
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        StoreValue::Str(value.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        StoreValue::Str(value)
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        StoreValue::Int(value)
    }
}

/// Durable key-value collaborator.
pub trait KeyValueStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_int(&self, key: &str) -> Option<i64>;
    fn set_value(&self, key: &str, value: StoreValue) -> Result<(), SessionError>;
}

fn as_string(value: &StoreValue) -> String {
    match value {
        StoreValue::Str(s) => s.clone(),
        StoreValue::Int(i) => i.to_string(),
    }
}

fn as_int(value: &StoreValue) -> Option<i64> {
    match value {
        StoreValue::Int(i) => Some(*i),
        StoreValue::Str(s) => s.parse().ok(),
    }
}

/// In-process store, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, StoreValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let values = self.values.lock().ok()?;
        values.get(key).map(as_string)
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        let values = self.values.lock().ok()?;
        values.get(key).and_then(as_int)
    }

    fn set_value(&self, key: &str, value: StoreValue) -> Result<(), SessionError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| SessionError::Persistence("memory store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// TOML-file store. The file is read once on open and rewritten on every set.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, StoreValue>>,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                SessionError::Persistence(format!("Failed to read store {:?}: {}", path, e))
            })?;
            toml::from_str(&content).map_err(|e| {
                SessionError::Persistence(format!("Failed to parse store {:?}: {}", path, e))
            })?
        } else {
            log::info!("Store file not found at {:?}, starting empty", path);
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, values: &BTreeMap<String, StoreValue>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    SessionError::Persistence(format!("Failed to create store directory: {}", e))
                })?;
            }
        }
        let content = toml::to_string_pretty(values)
            .map_err(|e| SessionError::Persistence(format!("Failed to serialize store: {}", e)))?;
        fs::write(&self.path, content)
            .map_err(|e| SessionError::Persistence(format!("Failed to write store: {}", e)))
    }
}

impl KeyValueStore for FileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let values = self.values.lock().ok()?;
        values.get(key).map(as_string)
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        let values = self.values.lock().ok()?;
        values.get(key).and_then(as_int)
    }

    fn set_value(&self, key: &str, value: StoreValue) -> Result<(), SessionError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| SessionError::Persistence("file store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        self.write(&values)
    }
}

/// Owner of the applied credential set.
///
/// The applied set starts out as the saved credentials. Transports read it
/// lazily when they connect; applying new credentials never contacts them.
pub struct CredentialStore {
    applied: Arc<RwLock<CredentialSet>>,
    defaults: DefaultCreds,
    kv: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(defaults: CredentialSet, kv: Arc<dyn KeyValueStore>) -> Self {
        let defaults = DefaultCreds::new(defaults);
        let saved = SavedCreds::new(kv.clone(), defaults.clone());
        let applied = CredentialSet::from_source(&saved);
        log::info!("Initial credentials: {}", applied.summary());

        Self {
            applied: Arc::new(RwLock::new(applied)),
            defaults,
            kv,
        }
    }

    pub fn default_source(&self) -> DefaultCreds {
        self.defaults.clone()
    }

    pub fn saved_source(&self) -> SavedCreds {
        SavedCreds::new(self.kv.clone(), self.defaults.clone())
    }

    pub fn current_source(&self) -> CurrentCreds {
        CurrentCreds::new(self.applied.clone())
    }

    /// A source of the given flavour. `Ui` yields a fresh edit buffer seeded
    /// from the current credentials.
    pub fn source(&self, source_type: SourceType) -> Box<dyn CredentialSource> {
        match source_type {
            SourceType::Default => Box::new(self.default_source()),
            SourceType::Saved => Box::new(self.saved_source()),
            SourceType::Current => Box::new(self.current_source()),
            SourceType::Ui => Box::new(UiCreds::from_source(&self.current_source())),
        }
    }

    /// Snapshot of the applied credentials.
    pub fn applied(&self) -> CredentialSet {
        match self.applied.read() {
            Ok(set) => set.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Copy all seven fields of `source` into the applied set, and persist them
    /// when `save` is set.
    pub fn apply(&self, source: &dyn CredentialSource, save: bool) -> Result<(), SessionError> {
        let set = CredentialSet::from_source(source);
        log::info!(
            "Applying {} credentials (save: {}): {}",
            source.source_type().as_str(),
            save,
            set.summary()
        );

        match self.applied.write() {
            Ok(mut applied) => *applied = set.clone(),
            Err(poisoned) => *poisoned.into_inner() = set.clone(),
        }

        if save {
            for field in CredentialField::ALL {
                self.kv
                    .set_value(field.key(), StoreValue::Str(set.get(field).to_string()))?;
            }
            log::info!("Saved credentials to store");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_int_and_string() {
        let store = MemoryStore::new();
        store.set_value("A", StoreValue::Int(3)).unwrap();
        store.set_value("B", "7".into()).unwrap();

        assert_eq!(store.get_int("A"), Some(3));
        assert_eq!(store.get_string("A").as_deref(), Some("3"));
        assert_eq!(store.get_int("B"), Some(7));
        assert_eq!(store.get_string("missing"), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");

        {
            let store = FileStore::open(&path).unwrap();
            store.set_value("VIDEO_SOURCE_INDEX", StoreValue::Int(2)).unwrap();
            store.set_value("ACCOUNT_ID", "acct".into()).unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get_int("VIDEO_SOURCE_INDEX"), Some(2));
        assert_eq!(reopened.get_string("ACCOUNT_ID").as_deref(), Some("acct"));
    }

    #[test]
    fn test_apply_without_save_does_not_persist() {
        let kv = Arc::new(MemoryStore::new());
        let store = CredentialStore::new(CredentialSet::default(), kv.clone());

        let ui = UiCreds::from_source(&store.current_source());
        ui.set(CredentialField::AccountId, "temporary");
        store.apply(&ui, false).unwrap();

        assert_eq!(store.applied().account_id, "temporary");
        assert_eq!(kv.get_string(CredentialField::AccountId.key()), None);
    }

    #[test]
    fn test_apply_from_current_is_stable() {
        let store = CredentialStore::new(CredentialSet::default(), Arc::new(MemoryStore::new()));
        let before = store.applied();
        store.apply(&store.current_source(), false).unwrap();
        assert_eq!(store.applied(), before);
    }
}

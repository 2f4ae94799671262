use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fs, io, path::{Path, PathBuf}};
use thiserror::Error;
use tracing::warn;

pub const HISTORY_KEY: &str = "generation-history";
pub const SETTINGS_KEY: &str = "user-settings";
pub const SESSION_KEY: &str = "session-data";
pub const PREFERENCES_KEY: &str = "user-preferences";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl dyn KeyValueStore {
    /// Reads and decodes `key`, returning `fallback` when it is missing,
    /// unreadable or does not decode as `T`.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.get(key) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(key, error = %e, "Stored value has unexpected shape, using fallback");
                    fallback
                }
            },
            Ok(None) => fallback,
            Err(e) => {
                warn!(key, error = %e, "Storage read failed, using fallback");
                fallback
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.set(key, serde_json::to_value(value)?)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// A store that refuses every call, like private browsing or a full quota.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStore;

impl KeyValueStore for UnavailableStore {
    fn get(&self, _key: &str) -> Result<Option<Value>, StorageError> {
        Err(StorageError::Unavailable("storage is disabled".into()))
    }

    fn set(&self, _key: &str, _value: Value) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage is disabled".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn memory_store_round_trips_values() {
        let store = MemoryStore::new();
        assert!(store.get("session-data").unwrap().is_none());
        store.set("session-data", json!({"generationCount": 2})).unwrap();
        assert_eq!(store.get("session-data").unwrap(), Some(json!({"generationCount": 2})));
        store.remove("session-data").unwrap();
        assert!(store.get("session-data").unwrap().is_none());
    }

    #[test]
    fn get_or_falls_back_on_missing_corrupt_or_unavailable() {
        let memory: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        assert_eq!(memory.get_or::<Vec<u32>>("numbers", vec![9]), vec![9]);

        memory.set("numbers", json!("not a list")).unwrap();
        assert_eq!(memory.get_or::<Vec<u32>>("numbers", vec![9]), vec![9]);

        memory.set_json("numbers", &[1u32, 2, 3]).unwrap();
        assert_eq!(memory.get_or::<Vec<u32>>("numbers", vec![]), vec![1, 2, 3]);

        let offline: Arc<dyn KeyValueStore> = Arc::new(UnavailableStore);
        assert_eq!(offline.get_or::<Vec<u32>>("numbers", vec![4]), vec![4]);
        assert!(matches!(offline.set("numbers", json!([])), Err(StorageError::Unavailable(_))));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileStore::new(dir.path().join("studio"));
        first.set("user-settings", json!({"defaultStyle": "vintage"})).unwrap();

        let second = FileStore::new(dir.path().join("studio"));
        assert_eq!(second.get("user-settings").unwrap(), Some(json!({"defaultStyle": "vintage"})));

        second.remove("user-settings").unwrap();
        second.remove("user-settings").unwrap();
        assert!(first.get("user-settings").unwrap().is_none());
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for key in ["", "../escape", "a/b", "dots.json"] {
            assert!(matches!(store.get(key), Err(StorageError::InvalidKey(_))), "{key:?}");
        }
    }

    #[test]
    fn file_store_reports_corrupt_documents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("generation-history.json"), b"{ nope").unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(store.get(HISTORY_KEY), Err(StorageError::Serde(_))));
    }
}

//! Durable key/value storage for values that outlive a single process.

use crate::errors::StateError;
use dashmap::DashMap;
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Default directory, relative to a namespace, that holds persisted values.
pub const DEFAULT_STATE_DIR: &str = ".test-data";

/// A namespaced key/value store for JSON values.
///
/// Writers own creation and cleanup stages own deletion; concurrent
/// writers to one key are a usage error.
pub trait StateStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    fn save_value(&self, namespace: &Path, key: &str, value: &Value) -> Result<(), StateError>;

    /// Loads the value stored under `key`.
    ///
    /// A missing key is [`StateError::NotFound`]; there is no default.
    fn load_value(&self, namespace: &Path, key: &str) -> Result<Value, StateError>;

    /// Removes `key`. Removing a missing key succeeds.
    fn delete(&self, namespace: &Path, key: &str) -> Result<(), StateError>;

    /// Returns true if a value is stored under `key`.
    fn exists(&self, namespace: &Path, key: &str) -> Result<bool, StateError>;

    /// Lists the keys stored in `namespace`, sorted.
    fn keys(&self, namespace: &Path) -> Result<Vec<String>, StateError>;
}

/// Rejects keys that are empty, could escape the state directory, or
/// would be hidden like an in-flight temp file.
pub fn validate_key(key: &str) -> Result<(), StateError> {
    let reason = if key.is_empty() {
        Some("key must not be empty")
    } else if key.starts_with('.') {
        Some("key must not start with '.'")
    } else if key.contains('/') || key.contains('\\') {
        Some("key must not contain path separators")
    } else if key.contains("..") {
        Some("key must not contain '..'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StateError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Stores each key as a pretty-printed JSON file under
/// `<namespace>/<state_dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_dir: String,
}

impl Default for FileStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStateStore {
    /// Creates a store using [`DEFAULT_STATE_DIR`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state_dir: DEFAULT_STATE_DIR.to_string(),
        }
    }

    /// Sets the directory name used inside each namespace.
    #[must_use]
    pub fn with_state_dir(mut self, name: impl Into<String>) -> Self {
        self.state_dir = name.into();
        self
    }

    /// Returns the file path backing `key` in `namespace`.
    #[must_use]
    pub fn path_for(&self, namespace: &Path, key: &str) -> PathBuf {
        namespace.join(&self.state_dir).join(format!("{key}.json"))
    }

    fn io_error(key: &str, source: std::io::Error) -> StateError {
        StateError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl StateStore for FileStateStore {
    fn save_value(&self, namespace: &Path, key: &str, value: &Value) -> Result<(), StateError> {
        validate_key(key)?;
        let path = self.path_for(namespace, key);
        let dir = namespace.join(&self.state_dir);

        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StateError::Serialization {
            key: key.to_string(),
            source,
        })?;

        fs::create_dir_all(&dir).map_err(|e| Self::io_error(key, e))?;

        // Write beside the target and rename so readers never see a partial file.
        let tmp = dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(Self::io_error(key, e));
        }

        info!(key, path = %path.display(), "Saved value");
        Ok(())
    }

    fn load_value(&self, namespace: &Path, key: &str) -> Result<Value, StateError> {
        validate_key(key)?;
        let path = self.path_for(namespace, key);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StateError::NotFound {
                    namespace: namespace.to_path_buf(),
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(Self::io_error(key, e)),
        };

        debug!(key, path = %path.display(), "Loaded value");
        serde_json::from_slice(&bytes).map_err(|source| StateError::Serialization {
            key: key.to_string(),
            source,
        })
    }

    fn delete(&self, namespace: &Path, key: &str) -> Result<(), StateError> {
        validate_key(key)?;
        let path = self.path_for(namespace, key);

        match fs::remove_file(&path) {
            Ok(()) => {
                info!(key, path = %path.display(), "Deleted value");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key, "Nothing to delete");
                Ok(())
            }
            Err(e) => Err(Self::io_error(key, e)),
        }
    }

    fn exists(&self, namespace: &Path, key: &str) -> Result<bool, StateError> {
        validate_key(key)?;
        self.path_for(namespace, key)
            .try_exists()
            .map_err(|e| Self::io_error(key, e))
    }

    fn keys(&self, namespace: &Path) -> Result<Vec<String>, StateError> {
        let dir = namespace.join(&self.state_dir);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.state_dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let name = entry.map_err(|e| Self::io_error(&self.state_dir, e))?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Process-local store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    values: DashMap<(PathBuf, String), Value>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored values across all namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    fn save_value(&self, namespace: &Path, key: &str, value: &Value) -> Result<(), StateError> {
        validate_key(key)?;
        self.values
            .insert((namespace.to_path_buf(), key.to_string()), value.clone());
        Ok(())
    }

    fn load_value(&self, namespace: &Path, key: &str) -> Result<Value, StateError> {
        validate_key(key)?;
        self.values
            .get(&(namespace.to_path_buf(), key.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StateError::NotFound {
                namespace: namespace.to_path_buf(),
                key: key.to_string(),
            })
    }

    fn delete(&self, namespace: &Path, key: &str) -> Result<(), StateError> {
        validate_key(key)?;
        self.values.remove(&(namespace.to_path_buf(), key.to_string()));
        Ok(())
    }

    fn exists(&self, namespace: &Path, key: &str) -> Result<bool, StateError> {
        validate_key(key)?;
        Ok(self
            .values
            .contains_key(&(namespace.to_path_buf(), key.to_string())))
    }

    fn keys(&self, namespace: &Path) -> Result<Vec<String>, StateError> {
        let mut keys: Vec<String> = self
            .values
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

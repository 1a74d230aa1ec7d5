//! Typed access to the persisted values of one test folder.

use super::keys;
use super::store::{FileStateStore, StateStore};
use crate::errors::StateError;
use crate::provision::ProvisionOptions;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A store bound to one namespace, usually the test folder.
///
/// Stages save what later stages need, possibly in a different process,
/// and the cleanup stage removes it again so the next full run starts
/// from nothing.
#[derive(Clone)]
pub struct StageState {
    store: Arc<dyn StateStore>,
    namespace: PathBuf,
}

impl std::fmt::Debug for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageState")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl StageState {
    /// Binds `store` to `namespace`.
    pub fn new(store: Arc<dyn StateStore>, namespace: impl Into<PathBuf>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Binds a default [`FileStateStore`] to `namespace`.
    pub fn on_disk(namespace: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStateStore::new()), namespace)
    }

    /// Returns the namespace this handle reads and writes.
    #[must_use]
    pub fn namespace(&self) -> &Path {
        &self.namespace
    }

    /// Serializes and saves `value` under `key`.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StateError> {
        let json = serde_json::to_value(value).map_err(|source| StateError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.store.save_value(&self.namespace, key, &json)
    }

    /// Loads and deserializes the value under `key`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<T, StateError> {
        let json = self.store.load_value(&self.namespace, key)?;
        serde_json::from_value(json).map_err(|source| StateError::Serialization {
            key: key.to_string(),
            source,
        })
    }

    /// Saves a string.
    pub fn save_string(&self, key: &str, value: &str) -> Result<(), StateError> {
        self.save(key, value)
    }

    /// Loads a string.
    pub fn load_string(&self, key: &str) -> Result<String, StateError> {
        self.load(key)
    }

    /// Saves an integer.
    pub fn save_int(&self, key: &str, value: i64) -> Result<(), StateError> {
        self.save(key, &value)
    }

    /// Loads an integer.
    pub fn load_int(&self, key: &str) -> Result<i64, StateError> {
        self.load(key)
    }

    /// Saves the id of a built machine image.
    pub fn save_image_id(&self, image_id: &str) -> Result<(), StateError> {
        self.save_string(keys::IMAGE_ID, image_id)
    }

    /// Loads the id of a built machine image.
    pub fn load_image_id(&self) -> Result<String, StateError> {
        self.load_string(keys::IMAGE_ID)
    }

    /// Saves the options used to provision infrastructure, so a later
    /// invocation can validate or destroy the same deployment.
    pub fn save_provision_options(&self, options: &ProvisionOptions) -> Result<(), StateError> {
        self.save(keys::PROVISION_OPTIONS, options)
    }

    /// Loads previously saved provisioning options.
    pub fn load_provision_options(&self) -> Result<ProvisionOptions, StateError> {
        self.load(keys::PROVISION_OPTIONS)
    }

    /// Returns true if `key` has a saved value.
    pub fn exists(&self, key: &str) -> Result<bool, StateError> {
        self.store.exists(&self.namespace, key)
    }

    /// Deletes `key`. Deleting a missing key succeeds.
    pub fn cleanup(&self, key: &str) -> Result<(), StateError> {
        self.store.delete(&self.namespace, key)
    }

    /// Deletes every key in the namespace.
    pub fn cleanup_all(&self) -> Result<(), StateError> {
        let keys = self.store.keys(&self.namespace)?;
        for key in &keys {
            self.store.delete(&self.namespace, key)?;
        }
        info!(namespace = %self.namespace.display(), removed = keys.len(), "Cleaned up saved state");
        Ok(())
    }
}

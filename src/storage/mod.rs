//! Simple key-value persistence.
//!
//! The workbench keeps its environment variables and credentials in a flat
//! string-to-string store, the same shape a browser's local storage offers.
//! Two backends are provided: an in-process [`MemoryStorage`] and a JSON-file
//! backed [`FileStorage`].

pub mod file;

pub use file::FileStorage;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Errors raised by a key-value backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing file could not be read or written.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted document is not a JSON object of strings.
    #[error("storage is corrupt: {0}")]
    Corrupt(String),

    /// The in-memory lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// A flat string-to-string store.
///
/// Implementations must be safe to share between tasks; every method takes
/// `&self` and performs its own synchronisation.
pub trait KeyValueStorage: Send + Sync + std::fmt::Debug {
    /// Reads the value stored under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Lists every stored key.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Shared handle to any storage backend.
pub type SharedStorage = Arc<dyn KeyValueStorage>;

/// In-process storage. Contents are lost when the value is dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-populated with `items`.
    pub fn with_items<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.write().map_err(|_| StorageError::LockPoisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.write().map_err(|_| StorageError::LockPoisoned)?;
        items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let items = self.items.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(items.keys().cloned().collect())
    }
}

//! Environment management.
//!
//! Environments are named variable sets persisted through a
//! [`KeyValueStorage`](crate::storage::KeyValueStorage). One environment is
//! active at a time; its variables feed the `{{name}}` token resolver.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use api_workbench::environment::VariableStore;
//! use api_workbench::storage::MemoryStorage;
//!
//! let store = VariableStore::new(Arc::new(MemoryStorage::new()));
//! store.set("baseUrl", "https://api.test").unwrap();
//!
//! if let Some(url) = store.get("baseUrl").unwrap() {
//!     println!("Base URL: {}", url);
//! }
//! ```

pub mod models;
pub mod store;

pub use models::{
    default_variables, is_valid_variable_name, Environment, DEFAULT_ENVIRONMENT,
};
pub use store::{VariableSource, VariableStore};

use crate::storage::StorageError;

/// Errors raised while reading or editing environments
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// Variable names must match `[A-Za-z_][A-Za-z0-9_]*`
    #[error("invalid variable name '{0}'")]
    InvalidName(String),

    /// The named environment does not exist
    #[error("environment '{0}' not found")]
    NotFound(String),

    /// The default environment cannot be deleted
    #[error("the default environment cannot be deleted")]
    ProtectedEnvironment,

    /// Imported or persisted data has the wrong shape
    #[error("invalid environment format: {0}")]
    InvalidFormat(String),

    #[error("failed to parse environment data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

//! Configuration management for the workbench.
//!
//! Configuration is read from a JSON settings document under the
//! "api-workbench" key and merged with defaults. There is no global instance:
//! the loaded [`WorkbenchConfig`] is handed to the
//! [`DispatcherBuilder`](crate::executor::DispatcherBuilder).

pub mod schema;

pub use schema::{CacheSettings, RetrySettings, WorkbenchConfig};

use serde_json::Value;
use std::path::{Path, PathBuf};

/// Key of the workbench section in a settings document.
pub const SETTINGS_KEY: &str = "api-workbench";

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a settings JSON value.
///
/// This function reads the "api-workbench" settings, merges them with defaults
/// and validates the result. A section that fails to deserialize is logged and
/// ignored.
///
/// # Arguments
///
/// * `settings_json` - Optional JSON value containing user settings under "api-workbench" key
///
/// # Returns
///
/// `Ok(WorkbenchConfig)` with the loaded configuration, or `Err` if validation fails.
///
/// # Example
///
/// ```
/// use api_workbench::config::load_config;
/// use serde_json::json;
///
/// let settings = json!({
///     "api-workbench": {
///         "timeout": 60000,
///         "validateSsl": false
///     }
/// });
///
/// let config = load_config(Some(settings)).unwrap();
/// assert_eq!(config.timeout, 60000);
/// ```
pub fn load_config(settings_json: Option<Value>) -> Result<WorkbenchConfig, ConfigError> {
    let section = settings_json.and_then(|settings| settings.get(SETTINGS_KEY).cloned());
    from_section(section)
}

/// Loads configuration from a JSON file.
///
/// The file may either be a settings document with an "api-workbench" key or
/// the workbench section itself.
pub fn load_config_file(path: impl AsRef<Path>) -> Result<WorkbenchConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content)?;

    let section = match value.get(SETTINGS_KEY) {
        Some(section) => section.clone(),
        None => value,
    };
    log::debug!("Loading configuration from {}", path.display());
    from_section(Some(section))
}

fn from_section(section: Option<Value>) -> Result<WorkbenchConfig, ConfigError> {
    let mut config = WorkbenchConfig::default();

    if let Some(section) = section {
        match serde_json::from_value::<WorkbenchConfig>(section) {
            Ok(user_config) => config = config.merge(&user_config),
            Err(e) => log::warn!(
                "Failed to parse {} settings: {}. Using defaults.",
                SETTINGS_KEY,
                e
            ),
        }
    }

    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

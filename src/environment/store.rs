//! Persisted variable store.
//!
//! Layout inside the key-value storage:
//!
//! | key | value |
//! |---|---|
//! | `api_current_env` | name of the active environment |
//! | `api_environments` | JSON array of environment names |
//! | `api_env_variables.<env>` | JSON object `name -> value` |
//!
//! Nothing is cached here; every call goes back to the storage so that edits
//! made elsewhere are picked up by the next request.

use super::models::{default_variables, is_valid_variable_name, Environment, DEFAULT_ENVIRONMENT};
use super::EnvError;
use crate::events::{DispatchEvent, EventBus};
use crate::storage::SharedStorage;
use std::collections::HashMap;

pub const CURRENT_ENV_KEY: &str = "api_current_env";
pub const ENVIRONMENTS_KEY: &str = "api_environments";
pub const VARIABLES_KEY_PREFIX: &str = "api_env_variables";

/// Anything that can supply the variable set used for token substitution.
pub trait VariableSource: Send + Sync + std::fmt::Debug {
    /// Returns the variables of the active environment.
    fn variables(&self) -> Result<HashMap<String, String>, EnvError>;
}

impl VariableSource for Environment {
    fn variables(&self) -> Result<HashMap<String, String>, EnvError> {
        Ok(self.variables.clone())
    }
}

impl VariableSource for HashMap<String, String> {
    fn variables(&self) -> Result<HashMap<String, String>, EnvError> {
        Ok(self.clone())
    }
}

/// Environment variables persisted in a [`KeyValueStorage`](crate::storage::KeyValueStorage).
///
/// With an [`EventBus`] attached, every successful change publishes
/// [`DispatchEvent::EnvironmentChanged`].
#[derive(Debug, Clone)]
pub struct VariableStore {
    storage: SharedStorage,
    events: Option<EventBus>,
}

fn variables_key(environment: &str) -> String {
    format!("{}.{}", VARIABLES_KEY_PREFIX, environment)
}

impl VariableStore {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            events: None,
        }
    }

    /// Publishes change notifications on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// The underlying storage handle.
    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Name of the active environment, `default` when none was chosen.
    pub fn current_environment(&self) -> Result<String, EnvError> {
        Ok(self
            .storage
            .get_item(CURRENT_ENV_KEY)?
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()))
    }

    /// Switches the active environment.
    pub fn set_current_environment(&self, name: &str) -> Result<(), EnvError> {
        if !self.list_environments()?.iter().any(|env| env == name) {
            return Err(EnvError::NotFound(name.to_string()));
        }
        self.storage.set_item(CURRENT_ENV_KEY, name)?;
        log::debug!("Active environment switched to '{}'", name);
        self.notify_change();
        Ok(())
    }

    /// All known environment names. `default` is always present and first.
    pub fn list_environments(&self) -> Result<Vec<String>, EnvError> {
        let mut names: Vec<String> = match self.storage.get_item(ENVIRONMENTS_KEY)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        names.retain(|name| name != DEFAULT_ENVIRONMENT);
        names.insert(0, DEFAULT_ENVIRONMENT.to_string());
        Ok(names)
    }

    /// Reads the variables of `environment`.
    pub fn environment_variables(
        &self,
        environment: &str,
    ) -> Result<HashMap<String, String>, EnvError> {
        match self.storage.get_item(&variables_key(environment))? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None if environment == DEFAULT_ENVIRONMENT => Ok(default_variables()),
            None => Ok(HashMap::new()),
        }
    }

    /// Returns the active environment with its variables.
    pub fn active_environment(&self) -> Result<Environment, EnvError> {
        let name = self.current_environment()?;
        let variables = self.environment_variables(&name)?;
        Ok(Environment::with_variables(name, variables))
    }

    /// Looks up one variable in the active environment.
    pub fn get(&self, name: &str) -> Result<Option<String>, EnvError> {
        Ok(self.get_all()?.remove(name))
    }

    /// Every variable of the active environment.
    pub fn get_all(&self) -> Result<HashMap<String, String>, EnvError> {
        let current = self.current_environment()?;
        self.environment_variables(&current)
    }

    /// Sets one variable in the active environment.
    pub fn set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        if !is_valid_variable_name(name) {
            return Err(EnvError::InvalidName(name.to_string()));
        }
        let mut variables = self.get_all()?;
        variables.insert(name.to_string(), value.to_string());
        self.replace_all(variables)
    }

    /// Removes one variable from the active environment.
    pub fn delete(&self, name: &str) -> Result<(), EnvError> {
        let mut variables = self.get_all()?;
        variables.remove(name);
        self.replace_all(variables)
    }

    /// Replaces every variable of the active environment.
    pub fn replace_all(&self, variables: HashMap<String, String>) -> Result<(), EnvError> {
        let current = self.current_environment()?;
        self.write_environment(&current, &variables)?;
        self.notify_change();
        Ok(())
    }

    /// Drops the stored variables of the active environment. The default
    /// environment falls back to its built-in variables afterwards.
    pub fn clear(&self) -> Result<(), EnvError> {
        let current = self.current_environment()?;
        self.storage.remove_item(&variables_key(&current))?;
        self.notify_change();
        Ok(())
    }

    /// Creates (or overwrites) an environment. It starts from the default
    /// variable set with `variables` layered on top.
    pub fn create_environment(
        &self,
        name: &str,
        variables: HashMap<String, String>,
    ) -> Result<(), EnvError> {
        if name.trim().is_empty() {
            return Err(EnvError::InvalidFormat(
                "environment name must not be empty".to_string(),
            ));
        }

        let mut merged = default_variables();
        merged.extend(variables);
        self.write_environment(name, &merged)?;

        let mut names = self.list_environments()?;
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
            self.storage
                .set_item(ENVIRONMENTS_KEY, &serde_json::to_string(&names)?)?;
        }
        self.notify_change();
        Ok(())
    }

    /// Deletes an environment. Deleting the active one re-activates `default`.
    pub fn delete_environment(&self, name: &str) -> Result<(), EnvError> {
        if name == DEFAULT_ENVIRONMENT {
            return Err(EnvError::ProtectedEnvironment);
        }

        let mut names = self.list_environments()?;
        let before = names.len();
        names.retain(|existing| existing != name);
        if names.len() == before {
            return Err(EnvError::NotFound(name.to_string()));
        }

        self.storage
            .set_item(ENVIRONMENTS_KEY, &serde_json::to_string(&names)?)?;
        self.storage.remove_item(&variables_key(name))?;

        if self.current_environment()? == name {
            self.storage.set_item(CURRENT_ENV_KEY, DEFAULT_ENVIRONMENT)?;
        }
        self.notify_change();
        Ok(())
    }

    /// Pretty-printed JSON object of the active environment's variables.
    pub fn export_json(&self) -> Result<String, EnvError> {
        let variables: std::collections::BTreeMap<String, String> =
            self.get_all()?.into_iter().collect();
        Ok(serde_json::to_string_pretty(&variables)?)
    }

    /// Replaces the active environment's variables with a JSON object of strings.
    pub fn import_json(&self, json: &str) -> Result<(), EnvError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let object = value.as_object().ok_or_else(|| {
            EnvError::InvalidFormat("expected a JSON object of variables".to_string())
        })?;

        let mut variables = HashMap::with_capacity(object.len());
        for (name, value) in object {
            let value = value.as_str().ok_or_else(|| {
                EnvError::InvalidFormat(format!("variable '{}' must be a string", name))
            })?;
            variables.insert(name.clone(), value.to_string());
        }

        let imported = Environment::with_variables(self.current_environment()?, variables);
        let invalid = imported.invalid_names();
        if !invalid.is_empty() {
            return Err(EnvError::InvalidName(invalid.join(", ")));
        }

        self.replace_all(imported.variables)
    }

    fn notify_change(&self) {
        let Some(events) = &self.events else {
            return;
        };
        match self.active_environment() {
            Ok(environment) => events.publish(DispatchEvent::EnvironmentChanged {
                variables: environment.variable_names(),
                environment: environment.name,
            }),
            Err(e) => log::warn!("Failed to read environment for change notification: {}", e),
        }
    }

    fn write_environment(
        &self,
        environment: &str,
        variables: &HashMap<String, String>,
    ) -> Result<(), EnvError> {
        let serialized = serde_json::to_string(variables)?;
        self.storage
            .set_item(&variables_key(environment), &serialized)?;
        Ok(())
    }
}

impl VariableSource for VariableStore {
    fn variables(&self) -> Result<HashMap<String, String>, EnvError> {
        self.get_all()
    }
}

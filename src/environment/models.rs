//! Environment data models.
//!
//! An environment is a named set of variables (e.g. "dev", "staging",
//! "production"). Exactly one environment is active at a time and supplies
//! the values for `{{name}}` tokens.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the environment that always exists and cannot be deleted.
pub const DEFAULT_ENVIRONMENT: &str = "default";

static VARIABLE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Failed to compile variable name regex")
});

/// Returns `true` when `name` is usable as a variable name.
pub fn is_valid_variable_name(name: &str) -> bool {
    VARIABLE_NAME_REGEX.is_match(name)
}

/// Variables every fresh environment starts with.
pub fn default_variables() -> HashMap<String, String> {
    let mut variables = HashMap::new();
    variables.insert("baseUrl".to_string(), "https://api.example.com".to_string());
    variables.insert("apiKey".to_string(), String::new());
    variables.insert("token".to_string(), String::new());
    variables.insert("version".to_string(), "v1".to_string());
    variables
}

/// Represents a single environment with its variables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Environment {
    /// Environment name (e.g., "dev", "staging", "production")
    pub name: String,

    /// Variable key-value pairs for this environment
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl Environment {
    /// Creates a new environment with name and variables
    pub fn with_variables(name: impl Into<String>, variables: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            variables,
        }
    }

    /// Variable names, sorted.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the names of variables that do not satisfy
    /// [`is_valid_variable_name`].
    pub fn invalid_names(&self) -> Vec<String> {
        let mut invalid: Vec<String> = self
            .variables
            .keys()
            .filter(|name| !is_valid_variable_name(name))
            .cloned()
            .collect();
        invalid.sort();
        invalid
    }
}

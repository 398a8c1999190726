//! Template token substitution
//!
//! Replaces `{{name}}` tokens with values from the active environment. Tokens
//! whose name is not defined are left in place verbatim; substitution never
//! fails. Values are substituted as-is, a value that itself contains a token
//! is not expanded again.

use crate::environment::{VariableSource, VariableStore};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Cached regex pattern for matching `{{variableName}}`.
static TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("Failed to compile token regex"));

/// Result of [`TemplateResolver::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub is_valid: bool,
    /// Referenced names that are absent or empty, in first-occurrence order
    pub missing: Vec<String>,
}

/// Resolves `{{name}}` tokens against a [`VariableSource`].
///
/// The source is consulted on every call, so edits to the variable store are
/// visible to the very next resolution.
#[derive(Clone)]
pub struct TemplateResolver {
    source: Arc<dyn VariableSource>,
}

impl fmt::Debug for TemplateResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateResolver")
            .field("source", &self.source)
            .finish()
    }
}

impl TemplateResolver {
    pub fn new(source: Arc<dyn VariableSource>) -> Self {
        Self { source }
    }

    /// Resolver backed by a persisted [`VariableStore`].
    pub fn from_store(store: VariableStore) -> Self {
        Self::new(Arc::new(store))
    }

    /// Resolver over a fixed set of variables.
    pub fn from_variables(variables: HashMap<String, String>) -> Self {
        Self::new(Arc::new(variables))
    }

    /// Current variables. A failing source is logged and treated as empty.
    pub fn variables(&self) -> HashMap<String, String> {
        match self.source.variables() {
            Ok(variables) => variables,
            Err(e) => {
                log::warn!(
                    "Failed to read environment variables, leaving tokens unresolved: {}",
                    e
                );
                HashMap::new()
            }
        }
    }

    /// Substitutes every `{{name}}` token in `text`.
    ///
    /// # Arguments
    ///
    /// * `text` - Input that may contain tokens
    ///
    /// # Returns
    ///
    /// The text with known tokens replaced. Unknown tokens are kept literally;
    /// token-free input is returned unchanged without reading the store.
    pub fn resolve(&self, text: &str) -> String {
        if !Self::has_tokens(text) {
            return text.to_string();
        }
        substitute_tokens(text, &self.variables())
    }

    /// Resolves every value of `map`. Keys are left untouched.
    pub fn resolve_map(&self, map: &HashMap<String, String>) -> HashMap<String, String> {
        let variables = self.variables();
        map.iter()
            .map(|(key, value)| (key.clone(), substitute_tokens(value, &variables)))
            .collect()
    }

    /// Names referenced by `text`, de-duplicated, in first-occurrence order.
    pub fn extract_names(text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        TOKEN_REGEX
            .captures_iter(text)
            .filter_map(|cap| cap.get(1))
            .map(|name| name.as_str().to_string())
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    /// Returns `true` when `text` contains at least one token.
    pub fn has_tokens(text: &str) -> bool {
        TOKEN_REGEX.is_match(text)
    }

    /// Reports referenced names that are absent from the store or have an
    /// empty value.
    pub fn validate(&self, text: &str) -> Validation {
        let names = Self::extract_names(text);
        if names.is_empty() {
            return Validation {
                is_valid: true,
                missing: Vec::new(),
            };
        }

        let variables = self.variables();
        let missing: Vec<String> = names
            .into_iter()
            .filter(|name| variables.get(name).map_or(true, |value| value.is_empty()))
            .collect();

        Validation {
            is_valid: missing.is_empty(),
            missing,
        }
    }
}

/// Substitutes tokens in `text` using an already-loaded variable map
pub fn substitute_tokens(text: &str, variables: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(text.len() + (text.len() / 4));
    let mut last_match_end = 0;

    for cap in TOKEN_REGEX.captures_iter(text) {
        let (Some(full_match), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&text[last_match_end..full_match.start()]);
        match variables.get(name.as_str()) {
            Some(value) => result.push_str(value),
            None => result.push_str(full_match.as_str()),
        }
        last_match_end = full_match.end();
    }

    result.push_str(&text[last_match_end..]);
    result
}

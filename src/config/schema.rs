//! Configuration schema for the workbench.
//!
//! This module defines the configuration structure and validation logic for all
//! user-configurable settings: transport behavior, caching, retries and the
//! storage keys cleared when a session expires.

use crate::cache::{CacheConfig, CacheStrategy};
use crate::retry::{ErrorKind, RetryConfig, RetryStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for the workbench.
///
/// Settings are read from the "api-workbench" key of a JSON settings document.
/// Missing settings fall back to sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbenchConfig {
    /// Request timeout in milliseconds.
    ///
    /// Maximum time to wait for a complete exchange (connection, headers and
    /// body download). Defaults to 30000ms (30 seconds).
    ///
    /// Must be greater than 0.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Whether to automatically follow HTTP redirects. Defaults to true.
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,

    /// Maximum number of redirects to follow.
    ///
    /// Only used when `follow_redirects` is true. Defaults to 5.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Whether to validate TLS certificates. Defaults to true.
    ///
    /// **Warning:** Disabling validation can expose you to security risks.
    #[serde(default = "default_validate_ssl", alias = "validateSSL")]
    pub validate_ssl: bool,

    /// Headers added to every request unless the request sets them itself.
    /// Defaults to `Accept: application/json`.
    #[serde(default = "default_headers")]
    pub default_headers: HashMap<String, String>,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    /// Storage keys removed when a request fails with 401.
    #[serde(default = "default_credential_keys")]
    pub credential_keys: Vec<String>,

    /// Storage keys searched in order for the session token.
    #[serde(default = "default_token_keys")]
    pub token_keys: Vec<String>,

    /// Headers that carry the session token when a request has no
    /// `Authorization` header. Empty disables token attachment.
    #[serde(default = "default_token_headers")]
    pub token_headers: Vec<String>,
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    /// When false every request behaves as `no-cache`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of cached responses. Must be > 0.
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Lifetime of an entry in milliseconds. Must be > 0.
    #[serde(default = "default_cache_ttl")]
    pub default_ttl: u64,

    /// Interval of the expiry sweep in milliseconds. Must be > 0.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,

    /// Strategy used when a request does not choose one
    #[serde(default)]
    pub strategy: CacheStrategy,
}

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    /// When false no request is retried
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub strategy: RetryStrategy,

    /// First backoff delay in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay: u64,

    /// Upper bound of any backoff delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,

    /// Error kinds that are retried
    #[serde(default = "ErrorKind::default_retryable")]
    pub retryable: Vec<ErrorKind>,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            follow_redirects: default_follow_redirects(),
            max_redirects: default_max_redirects(),
            validate_ssl: default_validate_ssl(),
            default_headers: default_headers(),
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
            credential_keys: default_credential_keys(),
            token_keys: default_token_keys(),
            token_headers: default_token_headers(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: default_cache_max_size(),
            default_ttl: default_cache_ttl(),
            cleanup_interval: default_cleanup_interval(),
            strategy: CacheStrategy::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            strategy: RetryStrategy::default(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            retryable: ErrorKind::default_retryable(),
        }
    }
}

impl WorkbenchConfig {
    /// Validates the configuration and returns errors if any settings are invalid.
    ///
    /// # Returns
    ///
    /// `Ok(())` if all settings are valid, or `Err` with a descriptive error message.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }

        if self.cache.max_size == 0 {
            return Err("cache.maxSize must be greater than 0".to_string());
        }

        if self.cache.default_ttl == 0 {
            return Err("cache.defaultTtl must be greater than 0".to_string());
        }

        if self.cache.cleanup_interval == 0 {
            return Err("cache.cleanupInterval must be greater than 0".to_string());
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err("retry.baseDelay must not exceed retry.maxDelay".to_string());
        }

        Ok(())
    }

    /// Returns the timeout as a `std::time::Duration`.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Strategy applied when a request does not specify one.
    pub fn default_cache_strategy(&self) -> CacheStrategy {
        if self.cache.enabled {
            self.cache.strategy
        } else {
            CacheStrategy::NoCache
        }
    }

    /// Cache engine settings.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_size: self.cache.max_size,
            default_ttl: Duration::from_millis(self.cache.default_ttl),
            cleanup_interval: Duration::from_millis(self.cache.cleanup_interval),
        }
    }

    /// Retry policy settings. A disabled retry section yields a policy that
    /// never retries.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: if self.retry.enabled {
                self.retry.max_retries
            } else {
                0
            },
            strategy: if self.retry.enabled {
                self.retry.strategy
            } else {
                RetryStrategy::None
            },
            base_delay: Duration::from_millis(self.retry.base_delay),
            max_delay: Duration::from_millis(self.retry.max_delay),
            retryable: self.retry.retryable.clone(),
        }
    }

    /// Merges this configuration with another, using values from `other` where present.
    ///
    /// # Arguments
    ///
    /// * `other` - Configuration to merge with (takes precedence)
    ///
    /// # Returns
    ///
    /// A new `WorkbenchConfig` with merged values. Default headers are
    /// combined, with `other` winning on conflicts.
    pub fn merge(&self, other: &WorkbenchConfig) -> Self {
        let mut default_headers = self.default_headers.clone();
        for (name, value) in &other.default_headers {
            default_headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
            default_headers.insert(name.clone(), value.clone());
        }

        Self {
            timeout: other.timeout,
            follow_redirects: other.follow_redirects,
            max_redirects: other.max_redirects,
            validate_ssl: other.validate_ssl,
            default_headers,
            cache: other.cache.clone(),
            retry: other.retry.clone(),
            credential_keys: other.credential_keys.clone(),
            token_keys: other.token_keys.clone(),
            token_headers: other.token_headers.clone(),
        }
    }
}

// Default value functions for serde

fn default_timeout() -> u64 {
    30000
}

fn default_follow_redirects() -> bool {
    true
}

fn default_max_redirects() -> u32 {
    5
}

fn default_validate_ssl() -> bool {
    true
}

fn default_true() -> bool {
    true
}

fn default_headers() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Accept".to_string(), "application/json".to_string());
    headers
}

fn default_cache_max_size() -> usize {
    200
}

fn default_cache_ttl() -> u64 {
    300_000 // 5 minutes
}

fn default_cleanup_interval() -> u64 {
    120_000 // 2 minutes
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_credential_keys() -> Vec<String> {
    ["zy_token", "access_token", "refresh_token", "auth_token"]
        .iter()
        .map(|key| key.to_string())
        .collect()
}

fn default_token_keys() -> Vec<String> {
    vec!["zy_token".to_string(), "access_token".to_string()]
}

fn default_token_headers() -> Vec<String> {
    vec!["zy_token".to_string(), "access-token".to_string()]
}

//! Classified retry with backoff.
//!
//! [`RetryPolicy::execute_with_retry`] runs a request function until it
//! succeeds, the attempt budget is spent, the failure is not retryable, or the
//! network is reported offline. Attempts are strictly sequential; between
//! attempts the policy sleeps for a backoff delay with up to 10% jitter.

pub mod error;
pub mod network;

pub use error::{AttemptError, ErrorKind, RequestFailure};
pub use network::NetworkMonitor;

use crate::executor::{AbortSignal, TransportError};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Never retry
    None,
    /// `base`
    Fixed,
    /// `base * n`
    Linear,
    /// `base * 2^(n-1)`
    #[default]
    Exponential,
}

/// Retry policy settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub strategy: RetryStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategy: RetryStrategy::Exponential,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            retryable: ErrorKind::default_retryable(),
        }
    }
}

/// Per-call overrides of [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    pub max_retries: Option<u32>,
    pub strategy: Option<RetryStrategy>,
    /// Ends the backoff wait early; the call then fails as cancelled
    pub signal: Option<AbortSignal>,
}

/// Occurrences of one error kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCount {
    pub count: u64,
    pub last_occurred: Option<DateTime<Utc>>,
}

/// Outcome counters of calls that needed or exhausted retries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryCount {
    pub count: u64,
    /// Retries performed across all counted calls
    pub total_retries: u64,
}

/// Snapshot returned by [`RetryPolicy::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    /// Failed attempts per kind
    pub errors: BTreeMap<ErrorKind, ErrorCount>,
    /// Calls that succeeded after at least one retry
    pub retry_successes: RetryCount,
    /// Calls that ended in failure
    pub retry_failures: RetryCount,
    pub is_online: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StatsInner {
    errors: BTreeMap<ErrorKind, ErrorCount>,
    successes: RetryCount,
    failures: RetryCount,
}

/// Classified, backoff-based retry.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    monitor: NetworkMonitor,
    stats: Mutex<StatsInner>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default(), NetworkMonitor::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, monitor: NetworkMonitor) -> Self {
        Self {
            config,
            monitor,
            stats: Mutex::new(StatsInner::default()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.config.retryable.contains(&kind)
    }

    /// Backoff for retry number `attempt` (1-indexed) before jitter.
    pub fn base_delay_for(&self, attempt: u32, strategy: RetryStrategy) -> Duration {
        let base = self.config.base_delay.as_millis() as f64;
        let delay = match strategy {
            RetryStrategy::None => 0.0,
            RetryStrategy::Fixed => base,
            RetryStrategy::Linear => base * f64::from(attempt.max(1)),
            RetryStrategy::Exponential => {
                base * 2f64.powi(attempt.max(1).saturating_sub(1).min(62) as i32)
            }
        };
        Duration::from_millis(delay.min(self.config.max_delay.as_millis() as f64) as u64)
    }

    /// Delay before retry number `attempt` (1-indexed).
    ///
    /// # Returns
    ///
    /// The strategy's base delay plus a random jitter of up to 10% of it,
    /// clamped to `max_delay`.
    pub fn calculate_delay(&self, attempt: u32, strategy: RetryStrategy) -> Duration {
        let delay = self.base_delay_for(attempt, strategy).as_millis() as f64;
        let jitter = rand::thread_rng().gen::<f64>() * 0.1 * delay;
        let max = self.config.max_delay.as_millis() as f64;
        Duration::from_millis((delay + jitter).min(max) as u64)
    }

    /// Runs `request_fn` with retries.
    ///
    /// # Arguments
    ///
    /// * `request_id` - Identifier attached to logs and to the final failure
    /// * `options` - Overrides for the retry budget and strategy
    /// * `request_fn` - Performs one attempt; receives the 0-based attempt number
    ///
    /// # Returns
    ///
    /// The first successful result, or the enhanced [`RequestFailure`] of the
    /// last attempt.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        request_id: &str,
        options: RetryOptions,
        mut request_fn: F,
    ) -> Result<T, RequestFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let strategy = options.strategy.unwrap_or(self.config.strategy);
        let max_retries = if strategy == RetryStrategy::None {
            0
        } else {
            options.max_retries.unwrap_or(self.config.max_retries)
        };

        let mut attempt: u32 = 0;
        loop {
            match request_fn(attempt).await {
                Ok(result) => {
                    if attempt > 0 {
                        self.record_outcome(true, attempt);
                        log::info!("Request {} succeeded after {} retries", request_id, attempt);
                    }
                    return Ok(result);
                }
                Err(err) => {
                    let kind = err.kind();
                    self.record_error(kind);

                    let online = self.monitor.is_online();
                    if attempt >= max_retries
                        || err.is_final()
                        || !self.is_retryable(kind)
                        || !online
                    {
                        if !online {
                            log::warn!("Network offline, not retrying request {}", request_id);
                        }
                        self.record_outcome(false, attempt);
                        return Err(RequestFailure::from_attempt(
                            err,
                            request_id,
                            attempt + 1,
                            online,
                        ));
                    }

                    attempt += 1;
                    let delay = self.calculate_delay(attempt, strategy);
                    log::warn!(
                        "Request {} failed ({}), retry {}/{} in {}ms",
                        request_id,
                        kind,
                        attempt,
                        max_retries,
                        delay.as_millis()
                    );
                    if let Some(signal) = &options.signal {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = signal.aborted() => {
                                log::info!("Request {} cancelled during backoff", request_id);
                                self.record_outcome(false, attempt - 1);
                                return Err(RequestFailure::from_attempt(
                                    AttemptError::from(TransportError::aborted(
                                        "cancelled while waiting to retry",
                                    )),
                                    request_id,
                                    attempt,
                                    online,
                                ));
                            }
                        }
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    fn record_error(&self, kind: ErrorKind) {
        if let Ok(mut stats) = self.stats.lock() {
            let entry = stats.errors.entry(kind).or_default();
            entry.count += 1;
            entry.last_occurred = Some(Utc::now());
            log::debug!("{} errors so far: {}", kind, entry.count);
        }
    }

    fn record_outcome(&self, success: bool, retries: u32) {
        if let Ok(mut stats) = self.stats.lock() {
            let counter = if success {
                &mut stats.successes
            } else {
                &mut stats.failures
            };
            counter.count += 1;
            counter.total_retries += u64::from(retries);
        }
    }

    /// Snapshot of error and retry counters.
    pub fn stats(&self) -> ErrorStats {
        let (errors, successes, failures) = match self.stats.lock() {
            Ok(stats) => (
                stats.errors.clone(),
                stats.successes.clone(),
                stats.failures.clone(),
            ),
            Err(_) => Default::default(),
        };

        ErrorStats {
            errors,
            retry_successes: successes,
            retry_failures: failures,
            is_online: self.monitor.is_online(),
            checked_at: Utc::now(),
        }
    }

    pub fn clear_stats(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats = StatsInner::default();
        }
    }
}

//! Request dispatch.
//!
//! [`Dispatcher::execute`] drives one request through the whole pipeline:
//!
//! 1. build the execution and display projections of the request, attaching
//!    the stored session token when no `Authorization` header is set
//! 2. fingerprint the execution projection and consult the cache strategy
//! 3. register with the [`DeduplicationGate`]; an identical in-flight request
//!    causes this one to be refused
//! 4. send through the [`Transport`] inside the retry loop
//! 5. normalize the response, store it when cacheable, publish events
//!
//! Logs and events only ever see the display projection.
//!
//! [`Dispatcher::execute_all`] and [`Dispatcher::execute_settled`] run batches
//! with bounded concurrency.

use super::dedup::{fingerprint_request, CancelError, DeduplicationGate};
use super::error::DispatchError;
use super::native::ReqwestTransport;
use super::transport::{send_with_abort, SendOptions, Transport, TransportError};
use crate::builder::{DisplayRequest, RequestBuilder, ResolvedRequest};
use crate::cache::{CacheEngine, CacheStats, CacheStrategy};
use crate::config::WorkbenchConfig;
use crate::environment::VariableStore;
use crate::events::{DispatchEvent, EventBus};
use crate::models::{NormalizedResponse, RequestSpec};
use crate::retry::{
    AttemptError, ErrorKind, ErrorStats, NetworkMonitor, RequestFailure, RetryOptions,
    RetryPolicy, RetryStrategy,
};
use crate::storage::{MemoryStorage, SharedStorage};
use crate::variables::TemplateResolver;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Requests in flight at once when a batch gives no limit.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Per-call overrides. Unset fields fall back to the dispatcher's
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub cache_strategy: Option<CacheStrategy>,
    /// Lifetime of the cache entry written by this call
    pub cache_ttl: Option<Duration>,
    pub max_retries: Option<u32>,
    pub retry_strategy: Option<RetryStrategy>,
    /// Per-attempt timeout
    pub timeout: Option<Duration>,
    /// Id used for logs, events and cancellation; generated when unset
    pub request_id: Option<String>,
}

impl ExecuteOptions {
    pub fn with_cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = Some(strategy);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Runs requests through resolution, de-duplication, caching and retry.
///
/// Clones share the same cache, gate, statistics and event bus.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    store: VariableStore,
    builder: RequestBuilder,
    cache: CacheEngine,
    retry: Arc<RetryPolicy>,
    gate: DeduplicationGate,
    events: EventBus,
    config: Arc<WorkbenchConfig>,
}

/// Assembles a [`Dispatcher`]. Every collaborator has a default.
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    transport: Option<Arc<dyn Transport>>,
    store: Option<VariableStore>,
    cache: Option<CacheEngine>,
    retry: Option<RetryPolicy>,
    monitor: Option<NetworkMonitor>,
    events: Option<EventBus>,
    config: Option<WorkbenchConfig>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Storage holding environments and credentials.
    pub fn storage(mut self, storage: SharedStorage) -> Self {
        self.store = Some(VariableStore::new(storage));
        self
    }

    pub fn variable_store(mut self, store: VariableStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(mut self, cache: CacheEngine) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Retry policy. Its network monitor becomes the dispatcher's.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Network monitor used when no retry policy is supplied.
    pub fn network_monitor(mut self, monitor: NetworkMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: WorkbenchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the dispatcher.
    ///
    /// # Returns
    ///
    /// The dispatcher, or an error when the default reqwest transport cannot
    /// be created.
    pub fn build(self) -> Result<Dispatcher, TransportError> {
        let config = self.config.unwrap_or_default();

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config)?),
        };

        let events = self.events.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| VariableStore::new(Arc::new(MemoryStorage::new())))
            .with_events(events.clone());

        let retry = match self.retry {
            Some(policy) => policy,
            None => RetryPolicy::new(config.retry_config(), self.monitor.unwrap_or_default()),
        };

        let cache = self
            .cache
            .unwrap_or_else(|| CacheEngine::new(config.cache_config()));

        let builder = RequestBuilder::new(TemplateResolver::from_store(store.clone()))
            .with_default_headers(config.default_headers.clone());

        Ok(Dispatcher {
            transport,
            store,
            builder,
            cache,
            retry: Arc::new(retry),
            gate: DeduplicationGate::new(),
            events,
            config: Arc::new(config),
        })
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatcher with default collaborators and the given configuration.
    pub fn new(config: WorkbenchConfig) -> Result<Self, TransportError> {
        DispatcherBuilder::new().config(config).build()
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn variable_store(&self) -> &VariableStore {
        &self.store
    }

    pub fn cache(&self) -> &CacheEngine {
        &self.cache
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn request_builder(&self) -> &RequestBuilder {
        &self.builder
    }

    /// What the user should see for `spec`: literal tokens, no credentials.
    pub fn display_request(&self, spec: &RequestSpec) -> DisplayRequest {
        self.builder.build_display(spec)
    }

    /// Executes `spec`.
    ///
    /// # Arguments
    ///
    /// * `spec` - The request as composed by the user
    /// * `options` - Per-call cache, retry and timeout overrides
    ///
    /// # Returns
    ///
    /// The normalized response (possibly served from cache), or a
    /// [`DispatchError`] describing why none could be produced.
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        options: ExecuteOptions,
    ) -> Result<NormalizedResponse, DispatchError> {
        let request_id = options
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let display = self.builder.build_display(spec);
        let mut request = self.builder.build(spec)?;
        self.attach_session_token(&mut request);
        let key = fingerprint_request(&request);

        let strategy = options
            .cache_strategy
            .unwrap_or_else(|| self.config.default_cache_strategy());

        if strategy.reads_before_network() {
            if let Some(cached) = self.cache.get(&key) {
                log::debug!("Cache hit for {} {}", display.method, display.url);
                let response = cached.served_from_cache(&request_id);
                self.publish_completed(&response);
                return Ok(response);
            }
            if strategy == CacheStrategy::CacheOnly {
                log::debug!("Cache miss for {} {}", display.method, display.url);
                return Err(DispatchError::CacheMiss { key });
            }
        }

        let Some(guard) = self.gate.guard(&key, &request_id) else {
            log::warn!(
                "Duplicate request cancelled: {} {}",
                display.method,
                display.url
            );
            self.events.publish(DispatchEvent::DuplicateCancelled {
                request_id,
                url: display.url,
            });
            return Err(DispatchError::DuplicateCancelled { fingerprint: key });
        };

        self.events.publish(DispatchEvent::RequestStarted {
            request_id: request_id.clone(),
            method: display.method.to_string(),
            url: display.url.clone(),
        });
        log::debug!(
            "Dispatching {} {} as {}",
            display.method,
            display.url,
            request_id
        );

        let send_options = SendOptions {
            timeout: options
                .timeout
                .unwrap_or_else(|| self.config.timeout_duration()),
            signal: Some(guard.signal().clone()),
        };
        let retry_options = RetryOptions {
            max_retries: options.max_retries,
            strategy: options.retry_strategy,
            signal: Some(guard.signal().clone()),
        };

        let outcome = self
            .retry
            .execute_with_retry(&request_id, retry_options, |_attempt| {
                let transport = self.transport.as_ref();
                let monitor = self.retry.monitor();
                let request = &request;
                let send_options = &send_options;
                let request_id = request_id.as_str();

                async move {
                    if !monitor.is_online() {
                        return Err(AttemptError::from(TransportError::network(
                            "network is offline",
                        )));
                    }

                    let started = Instant::now();
                    let raw = send_with_abort(transport, request, send_options).await?;
                    let response = NormalizedResponse::from_parts(
                        raw.status,
                        raw.status_text,
                        raw.headers,
                        &raw.body,
                        started.elapsed(),
                        request_id,
                    );

                    if response.status >= 400 {
                        Err(AttemptError::Status(response))
                    } else {
                        Ok(response)
                    }
                }
            })
            .await;

        match outcome {
            Ok(response) => {
                if strategy.writes() && request.method.is_cacheable() && response.is_success() {
                    self.cache.set(&key, response.clone(), options.cache_ttl);
                }
                log::info!(
                    "{} {} -> {} in {}ms",
                    display.method,
                    display.url,
                    response.status,
                    response.duration_ms
                );
                self.publish_completed(&response);
                Ok(response)
            }
            Err(failure) => {
                self.publish_failure_kind(&failure);

                if strategy == CacheStrategy::NetworkFirst {
                    if let Some(cached) = self.cache.get(&key) {
                        log::info!(
                            "{} {} failed ({}), serving cached response",
                            display.method,
                            display.url,
                            failure.kind
                        );
                        let response = cached.served_from_cache(&request_id);
                        self.publish_completed(&response);
                        return Ok(response);
                    }
                }

                log::error!(
                    "{} {} failed after {} attempt(s): {}",
                    display.method,
                    display.url,
                    failure.attempts,
                    failure.kind
                );
                self.events.publish(DispatchEvent::RequestFailed {
                    request_id: failure.request_id.clone(),
                    kind: failure.kind,
                    status: failure.status(),
                    message: failure.user_message.clone(),
                });
                Err(DispatchError::from(failure))
            }
        }
    }

    /// Executes `specs` with at most `concurrency` requests in flight.
    ///
    /// # Returns
    ///
    /// Responses in the order of `specs`, or the first failure. Requests
    /// still pending when a failure arrives are dropped, which releases
    /// their de-duplication slots.
    pub async fn execute_all(
        &self,
        specs: &[RequestSpec],
        options: ExecuteOptions,
        concurrency: usize,
    ) -> Result<Vec<NormalizedResponse>, DispatchError> {
        stream::iter(specs)
            .map(|spec| self.execute(spec, batch_options(&options)))
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }

    /// Executes `specs` with at most `concurrency` requests in flight and
    /// returns every outcome in the order of `specs`.
    pub async fn execute_settled(
        &self,
        specs: &[RequestSpec],
        options: ExecuteOptions,
        concurrency: usize,
    ) -> Vec<Result<NormalizedResponse, DispatchError>> {
        stream::iter(specs)
            .map(|spec| self.execute(spec, batch_options(&options)))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Adds the stored session token under every configured token header,
    /// unless the request already carries an `Authorization` header.
    fn attach_session_token(&self, request: &mut ResolvedRequest) {
        if self.config.token_headers.is_empty()
            || request
                .headers
                .keys()
                .any(|name| name.eq_ignore_ascii_case("authorization"))
        {
            return;
        }

        let Some(token) = self.stored_token() else {
            return;
        };
        for header in &self.config.token_headers {
            request.headers.insert(header.clone(), token.clone());
        }
    }

    fn stored_token(&self) -> Option<String> {
        self.config.token_keys.iter().find_map(|key| {
            match self.store.storage().get_item(key) {
                Ok(value) => value.filter(|token| !token.trim().is_empty()),
                Err(e) => {
                    log::warn!("Failed to read session token {}: {}", key, e);
                    None
                }
            }
        })
    }

    fn publish_completed(&self, response: &NormalizedResponse) {
        self.events.publish(DispatchEvent::RequestCompleted {
            request_id: response.request_id.clone(),
            status: response.status,
            cached: response.cached,
            duration_ms: response.duration_ms,
        });
    }

    /// Publishes the event specific to the failure's kind, if any.
    fn publish_failure_kind(&self, failure: &RequestFailure) {
        let request_id = failure.request_id.clone();
        match failure.kind {
            ErrorKind::Authentication => {
                self.clear_credentials();
                self.events
                    .publish(DispatchEvent::Unauthorized { request_id });
            }
            ErrorKind::Authorization => {
                self.events.publish(DispatchEvent::Forbidden { request_id });
            }
            ErrorKind::RateLimit => {
                self.events.publish(DispatchEvent::RateLimited {
                    request_id,
                    retry_after: failure.retry_after(),
                });
            }
            ErrorKind::Network | ErrorKind::Timeout => {
                self.events.publish(DispatchEvent::NetworkError {
                    request_id,
                    message: failure.user_message.clone(),
                });
            }
            _ => {}
        }
    }

    /// Removes the configured credential keys from storage.
    fn clear_credentials(&self) {
        for key in &self.config.credential_keys {
            if let Err(e) = self.store.storage().remove_item(key) {
                log::warn!("Failed to clear credential {}: {}", key, e);
            }
        }
        log::info!("Session expired, stored credentials cleared");
    }

    /// Cancels the in-flight request with `request_id`.
    pub fn cancel_request(&self, request_id: &str) -> Result<(), CancelError> {
        self.gate.cancel(request_id)
    }

    /// Cancels the most recently started in-flight request and returns its id.
    pub fn cancel_most_recent(&self) -> Result<String, CancelError> {
        self.gate.cancel_most_recent()
    }

    /// Ids of in-flight requests, oldest first.
    pub fn active_request_ids(&self) -> Vec<String> {
        self.gate.active_request_ids()
    }

    pub fn is_online(&self) -> bool {
        self.retry.monitor().is_online()
    }

    /// Records a connectivity change and publishes `NetworkUp`/`NetworkDown`
    /// when the state actually changed.
    pub fn set_online(&self, online: bool) {
        if !self.retry.monitor().set_online(online) {
            return;
        }

        if online {
            log::info!("Network connection restored");
            self.events.publish(DispatchEvent::NetworkUp);
        } else {
            log::warn!("Network connection lost");
            self.events.publish(DispatchEvent::NetworkDown);
        }
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.retry.stats()
    }

    pub fn clear_stats(&self) {
        self.retry.clear_stats();
    }
}

/// Per-item options of a batch: every item gets its own request id.
fn batch_options(options: &ExecuteOptions) -> ExecuteOptions {
    ExecuteOptions {
        request_id: None,
        ..options.clone()
    }
}

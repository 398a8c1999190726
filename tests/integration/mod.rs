//! Integration tests module for the workbench
//!
//! This module provides common utilities and test infrastructure: a
//! scriptable counting transport and dispatcher construction helpers.

pub mod dispatcher_test;
pub mod end_to_end_test;
pub mod resolver_properties_test;

use api_workbench::builder::ResolvedRequest;
use api_workbench::executor::{SendOptions, Transport, TransportError, TransportResponse};
use api_workbench::retry::{NetworkMonitor, RetryConfig, RetryPolicy};
use api_workbench::{Dispatcher, MemoryStorage, SharedStorage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initialize test environment (idempotent)
pub fn init_test_env() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Transport that replays scripted outcomes and counts calls.
///
/// Once the script is exhausted every call returns `200 {}`.
#[derive(Debug, Default)]
pub struct CountingTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    requests: Mutex<Vec<ResolvedRequest>>,
}

impl CountingTransport {
    pub fn new(script: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    /// Every call waits `delay` before answering.
    pub fn with_delay(
        script: Vec<Result<TransportResponse, TransportError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ResolvedRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        _options: &SendOptions,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::new(200, "{}")))
    }
}

/// Retry policy with millisecond delays.
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy::new(
        RetryConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            ..RetryConfig::default()
        },
        NetworkMonitor::default(),
    )
}

/// Dispatcher over `transport` and `storage` with fast retries.
pub fn dispatcher_with(transport: Arc<CountingTransport>, storage: SharedStorage) -> Dispatcher {
    Dispatcher::builder()
        .transport(transport)
        .storage(storage)
        .retry_policy(fast_retry_policy())
        .build()
        .expect("Failed to build dispatcher")
}

/// Dispatcher over `transport` with empty in-memory storage.
pub fn dispatcher(transport: Arc<CountingTransport>) -> Dispatcher {
    dispatcher_with(transport, Arc::new(MemoryStorage::new()))
}

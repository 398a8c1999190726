//! In-flight request de-duplication and cancellation.
//!
//! Every dispatched request registers its fingerprint with the
//! [`DeduplicationGate`]. While an entry exists, a second request with the
//! same fingerprint is refused rather than queued. Registration returns a
//! [`PendingGuard`]; dropping it removes the entry, so every exit path of a
//! request (success, failure, cancellation, panic) releases its slot.

use crate::builder::ResolvedRequest;
use crate::models::HttpMethod;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Prefix of every fingerprint
pub const FINGERPRINT_PREFIX: &str = "req_";

/// Cancellation signal shared between a request and whoever may cancel it.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Idempotent.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Completes once the signal has fired.
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// Errors for cancellation operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    /// No in-flight request matches.
    #[error("request not found: {0}")]
    NotFound(String),
}

#[derive(Debug)]
struct PendingEntry {
    request_id: String,
    sequence: u64,
    signal: AbortSignal,
}

/// Registry of in-flight requests keyed by fingerprint.
#[derive(Debug, Clone, Default)]
pub struct DeduplicationGate {
    pending: Arc<DashMap<String, PendingEntry>>,
    sequence: Arc<AtomicU64>,
}

impl DeduplicationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `fingerprint` for `request_id`.
    ///
    /// # Returns
    ///
    /// `Some(guard)` when the caller may proceed, `None` when a request with
    /// the same fingerprint is already in flight.
    pub fn guard(&self, fingerprint: &str, request_id: &str) -> Option<PendingGuard> {
        match self.pending.entry(fingerprint.to_string()) {
            Entry::Occupied(existing) => {
                log::debug!(
                    "Duplicate of in-flight request {} refused ({})",
                    existing.get().request_id,
                    request_id
                );
                None
            }
            Entry::Vacant(slot) => {
                let signal = AbortSignal::new();
                slot.insert(PendingEntry {
                    request_id: request_id.to_string(),
                    sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
                    signal: signal.clone(),
                });
                Some(PendingGuard {
                    pending: Arc::clone(&self.pending),
                    fingerprint: fingerprint.to_string(),
                    request_id: request_id.to_string(),
                    signal,
                })
            }
        }
    }

    /// Returns `true` while a request with `fingerprint` is in flight.
    pub fn is_pending(&self, fingerprint: &str) -> bool {
        self.pending.contains_key(fingerprint)
    }

    /// Fires the abort signal of the request with `request_id`.
    ///
    /// The entry itself is released by the request's guard once it settles.
    pub fn cancel(&self, request_id: &str) -> Result<(), CancelError> {
        let entry = self
            .pending
            .iter()
            .find(|entry| entry.value().request_id == request_id)
            .ok_or_else(|| CancelError::NotFound(request_id.to_string()))?;

        entry.value().signal.abort();
        log::debug!("Cancelled request {}", request_id);
        Ok(())
    }

    /// Cancels the most recently registered request and returns its id.
    pub fn cancel_most_recent(&self) -> Result<String, CancelError> {
        let request_id = self
            .pending
            .iter()
            .max_by_key(|entry| entry.value().sequence)
            .map(|entry| entry.value().request_id.clone())
            .ok_or_else(|| CancelError::NotFound("no active requests".to_string()))?;

        self.cancel(&request_id)?;
        Ok(request_id)
    }

    /// Number of requests in flight.
    pub fn active_count(&self) -> usize {
        self.pending.len()
    }

    /// Ids of in-flight requests, oldest first.
    pub fn active_request_ids(&self) -> Vec<String> {
        let mut entries: Vec<(u64, String)> = self
            .pending
            .iter()
            .map(|entry| (entry.value().sequence, entry.value().request_id.clone()))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, id)| id).collect()
    }
}

/// Registration of one in-flight request. Dropping it releases the slot.
#[derive(Debug)]
pub struct PendingGuard {
    pending: Arc<DashMap<String, PendingEntry>>,
    fingerprint: String,
    request_id: String,
    signal: AbortSignal,
}

impl PendingGuard {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Signal fired when this request is cancelled.
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let request_id = &self.request_id;
        self.pending
            .remove_if(&self.fingerprint, |_, entry| &entry.request_id == request_id);
    }
}

/// Computes the fingerprint of a request.
///
/// # Arguments
///
/// * `method` - HTTP method
/// * `url` - Execution URL
/// * `params` - Resolved query parameters
/// * `body` - Structural body value; ignored for GET
///
/// # Returns
///
/// `req_` followed by the hex SHA-256 of a canonical JSON document whose
/// object keys are sorted at every level.
pub fn fingerprint(
    method: HttpMethod,
    url: &str,
    params: &BTreeMap<String, String>,
    body: &Value,
) -> String {
    let data = if method == HttpMethod::GET {
        json!({})
    } else {
        body.clone()
    };

    let document = json!({
        "method": method.as_str(),
        "url": url,
        "params": params,
        "data": data,
    });

    let mut canonical = String::new();
    write_canonical(&document, &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    format!("{}{}", FINGERPRINT_PREFIX, hex::encode(digest))
}

/// Fingerprint of a built request.
pub fn fingerprint_request(request: &ResolvedRequest) -> String {
    fingerprint(
        request.method,
        &request.url,
        &request.params,
        &request.payload.fingerprint_value(),
    )
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(child) = map.get(*key) {
                    write_canonical(child, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

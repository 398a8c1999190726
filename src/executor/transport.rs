//! Transport abstraction.
//!
//! The transport performs one method + URL + headers + body exchange and
//! yields status, headers and body. Everything above it (dedup, cache, retry)
//! is transport-agnostic; [`ReqwestTransport`](super::native::ReqwestTransport)
//! is the production implementation.

use super::dedup::AbortSignal;
use crate::builder::ResolvedRequest;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Why an exchange produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Connection, DNS, TLS or protocol failure
    Network,
    /// The configured per-request timeout elapsed
    Timeout,
    /// The exchange was cancelled through its abort signal
    Aborted,
    /// The request could not be constructed; nothing was sent
    Invalid,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Network => write!(f, "network"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Aborted => write!(f, "aborted"),
            TransportErrorKind::Invalid => write!(f, "invalid request"),
        }
    }
}

/// A failed exchange: no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Aborted, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Invalid, message)
    }
}

/// Raw HTTP response, any status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Reason phrase for common status codes.
pub fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("")
}

/// Per-call transport options.
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub timeout: Duration,
    pub signal: Option<AbortSignal>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            signal: None,
        }
    }
}

/// Performs HTTP exchanges.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `request` and returns the response regardless of its status.
    /// Implementations enforce `options.timeout` and report it as
    /// [`TransportErrorKind::Timeout`].
    async fn send(
        &self,
        request: &ResolvedRequest,
        options: &SendOptions,
    ) -> Result<TransportResponse, TransportError>;
}

/// Sends through `transport`, aborting the in-flight exchange as soon as the
/// signal in `options` fires. Dropping the transport future tears down the
/// underlying connection.
pub async fn send_with_abort(
    transport: &dyn Transport,
    request: &ResolvedRequest,
    options: &SendOptions,
) -> Result<TransportResponse, TransportError> {
    let Some(signal) = options.signal.clone() else {
        return transport.send(request, options).await;
    };

    if signal.is_aborted() {
        return Err(TransportError::aborted("request cancelled before sending"));
    }

    tokio::select! {
        result = transport.send(request, options) => result,
        _ = signal.aborted() => Err(TransportError::aborted("request cancelled")),
    }
}

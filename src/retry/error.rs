//! Error classification and the enhanced failure returned to callers.

use crate::executor::transport::{TransportError, TransportErrorKind};
use crate::models::NormalizedResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No response: connection failure
    Network,
    /// No response: the request timed out
    Timeout,
    /// HTTP 401
    Authentication,
    /// HTTP 403
    Authorization,
    /// HTTP 422
    Validation,
    /// HTTP 429
    RateLimit,
    /// Other 4xx
    Client,
    /// 5xx
    Server,
    /// The caller cancelled the request
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Classifies an HTTP status. Only meaningful for statuses >= 400.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            422 => ErrorKind::Validation,
            429 => ErrorKind::RateLimit,
            400..=499 => ErrorKind::Client,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }

    /// Kinds retried by default.
    pub fn default_retryable() -> Vec<ErrorKind> {
        vec![
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::Server,
            ErrorKind::RateLimit,
        ]
    }

    /// Message suitable for showing to a person.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Network connection failed, please check your network settings",
            ErrorKind::Timeout => "The request timed out, please try again later",
            ErrorKind::Server => "The server is temporarily unavailable, please try again later",
            ErrorKind::Authentication => "Authentication failed, please sign in again",
            ErrorKind::Authorization => "You do not have permission to access this resource",
            ErrorKind::Validation => "The request data is invalid",
            ErrorKind::RateLimit => "Too many requests, please try again later",
            ErrorKind::Client => "Bad request",
            ErrorKind::Cancelled => "The request was cancelled",
            ErrorKind::Unknown => "Unknown error",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Validation => "validation",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Client => "client",
            ErrorKind::Server => "server",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// No response was received
    Transport(TransportError),
    /// A response arrived with a failure status
    Status(NormalizedResponse),
}

impl AttemptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttemptError::Transport(err) => match err.kind {
                TransportErrorKind::Timeout => ErrorKind::Timeout,
                TransportErrorKind::Network => ErrorKind::Network,
                TransportErrorKind::Aborted => ErrorKind::Cancelled,
                TransportErrorKind::Invalid => ErrorKind::Unknown,
            },
            AttemptError::Status(response) => ErrorKind::from_status(response.status),
        }
    }

    /// Whether repeating the attempt cannot change the outcome.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            AttemptError::Transport(TransportError {
                kind: TransportErrorKind::Aborted | TransportErrorKind::Invalid,
                ..
            })
        )
    }

    pub fn response(&self) -> Option<&NormalizedResponse> {
        match self {
            AttemptError::Status(response) => Some(response),
            AttemptError::Transport(_) => None,
        }
    }

    fn message(&self) -> String {
        match self {
            AttemptError::Transport(err) => err.message.clone(),
            AttemptError::Status(response) => format!(
                "request failed with status {} {}",
                response.status, response.status_text
            )
            .trim_end()
            .to_string(),
        }
    }
}

impl From<TransportError> for AttemptError {
    fn from(err: TransportError) -> Self {
        AttemptError::Transport(err)
    }
}

/// Terminal failure of a request after the retry loop gave up.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct RequestFailure {
    pub kind: ErrorKind,
    /// Technical description of the last attempt's failure
    pub message: String,
    /// Message for display; taken from the response body when it has one
    pub user_message: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_online: bool,
    /// Number of attempts made, including the first
    pub attempts: u32,
    /// Failed response, when one was received
    pub response: Option<NormalizedResponse>,
}

impl RequestFailure {
    /// Builds the enhanced failure for `error`.
    pub fn from_attempt(
        error: AttemptError,
        request_id: impl Into<String>,
        attempts: u32,
        is_online: bool,
    ) -> Self {
        let kind = error.kind();
        let user_message = error
            .response()
            .and_then(|response| message_from_body(&response.data))
            .unwrap_or_else(|| kind.user_message().to_string());

        Self {
            kind,
            message: error.message(),
            user_message,
            request_id: request_id.into(),
            timestamp: Utc::now(),
            is_online,
            attempts,
            response: match error {
                AttemptError::Status(response) => Some(response),
                AttemptError::Transport(_) => None,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|response| response.status)
    }

    /// Value of the `Retry-After` header of the failed response.
    pub fn retry_after(&self) -> Option<String> {
        self.response
            .as_ref()
            .and_then(|response| response.header("retry-after"))
            .map(str::to_string)
    }
}

/// `message`, or failing that `error`, from a JSON error body.
fn message_from_body(data: &serde_json::Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|field| data.get(field).and_then(|value| value.as_str()))
        .find(|message| !message.is_empty())
        .map(str::to_string)
}

//! Dispatch error types.
//!
//! This module defines the errors returned by
//! [`Dispatcher::execute`](super::Dispatcher::execute): build failures, refused
//! duplicates, cache-only misses and terminal request failures.

use crate::builder::BuildError;
use crate::retry::{ErrorKind, RequestFailure};

/// Errors that can end a dispatched request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request could not be built.
    #[error("request build error: {0}")]
    Build(#[from] BuildError),

    /// An identical request is already in flight.
    #[error("duplicate request cancelled: {fingerprint}")]
    DuplicateCancelled { fingerprint: String },

    /// `cache-only` was requested and nothing is cached.
    #[error("no cached response for {key}")]
    CacheMiss { key: String },

    /// The request failed after the retry loop gave up.
    #[error(transparent)]
    Request(Box<RequestFailure>),
}

impl DispatchError {
    /// Classification of the failure, when it came from the request itself.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DispatchError::Request(failure) => Some(failure.kind),
            _ => None,
        }
    }

    /// The enhanced failure, when there is one.
    pub fn failure(&self) -> Option<&RequestFailure> {
        match self {
            DispatchError::Request(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, DispatchError::DuplicateCancelled { .. })
    }
}

impl From<RequestFailure> for DispatchError {
    fn from(failure: RequestFailure) -> Self {
        DispatchError::Request(Box::new(failure))
    }
}

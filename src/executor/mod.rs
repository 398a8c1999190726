//! Request execution.
//!
//! The [`Dispatcher`] is the entry point: it builds a request from a
//! [`RequestSpec`](crate::models::RequestSpec), refuses duplicates of in-flight
//! requests, applies the cache strategy, and sends through a [`Transport`]
//! inside the retry loop. [`ReqwestTransport`] is the production transport.

pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod native;
pub mod transport;

pub use dedup::{
    fingerprint, fingerprint_request, AbortSignal, CancelError, DeduplicationGate, PendingGuard,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder, ExecuteOptions, DEFAULT_BATCH_CONCURRENCY};
pub use error::DispatchError;
pub use native::ReqwestTransport;
pub use transport::{
    send_with_abort, SendOptions, Transport, TransportError, TransportErrorKind,
    TransportResponse,
};

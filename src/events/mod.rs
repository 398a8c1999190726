//! Lifecycle notifications.
//!
//! The dispatcher publishes [`DispatchEvent`]s on an [`EventBus`]; UI code
//! subscribes to react to expired sessions, rate limiting or connectivity
//! changes. Events only ever carry display URLs, never variable values.

use crate::retry::ErrorKind;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// Something that happened while dispatching requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DispatchEvent {
    RequestStarted {
        request_id: String,
        method: String,
        url: String,
    },
    RequestCompleted {
        request_id: String,
        status: u16,
        cached: bool,
        duration_ms: u64,
    },
    RequestFailed {
        request_id: String,
        kind: ErrorKind,
        status: Option<u16>,
        message: String,
    },
    /// A request was refused because an identical one is in flight
    DuplicateCancelled { request_id: String, url: String },
    /// A 401 ended a request; stored credentials were cleared
    Unauthorized { request_id: String },
    /// A 403 ended a request
    Forbidden { request_id: String },
    /// A 429 ended a request
    RateLimited {
        request_id: String,
        retry_after: Option<String>,
    },
    /// A request ended without a response
    NetworkError { request_id: String, message: String },
    NetworkDown,
    NetworkUp,
    /// Variables or the active environment changed. Carries names only.
    EnvironmentChanged {
        environment: String,
        variables: Vec<String>,
    },
}

/// Publish/subscribe channel for [`DispatchEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event`. Having no subscribers is not an error.
    pub fn publish(&self, event: DispatchEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("Event dropped, no subscribers");
        }
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

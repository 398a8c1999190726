//! API Workbench
//!
//! Request resolution, caching and retry pipeline for an interactive HTTP
//! client. A request is composed as a [`RequestSpec`] whose URL, params,
//! headers, auth and body may contain `{{name}}` tokens; the workbench resolves
//! them against the active environment and sends the request.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - **storage**: Flat key-value persistence (in memory or a JSON file)
//! - **environment**: Named environments and their variables
//! - **variables**: `{{name}}` token substitution
//! - **models**: Request descriptors and the normalized response
//! - **auth**: `Authorization` header construction
//! - **builder**: Display and execution projections of a request
//! - **executor**: De-duplication, transport and the dispatcher
//! - **cache**: TTL + LRU response cache
//! - **retry**: Error classification and backoff
//! - **events**: Lifecycle notifications
//! - **config**: User settings
//!
//! # Request flow
//!
//! [`Dispatcher::execute`] performs, in order:
//! 1. Builds the display projection (literal tokens) and the execution
//!    projection (resolved and encoded)
//! 2. Fingerprints the execution projection and applies the cache strategy
//! 3. Refuses the request if an identical one is in flight
//! 4. Sends it through the transport, retrying classified failures
//! 5. Normalizes the response and caches successful GETs
//!
//! # Usage
//!
//! ```no_run
//! use api_workbench::{Dispatcher, ExecuteOptions, RequestSpec, WorkbenchConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::new(WorkbenchConfig::default())?;
//! dispatcher.variable_store().set("userId", "42")?;
//!
//! let spec = RequestSpec::get("{{baseUrl}}/users/{{userId}}").with_param("q", "a b");
//! let response = dispatcher.execute(&spec, ExecuteOptions::default()).await?;
//! println!("{} {}", response.status, response.data);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod builder;
pub mod cache;
pub mod config;
pub mod environment;
pub mod events;
pub mod executor;
pub mod models;
pub mod retry;
pub mod storage;
pub mod variables;

pub use builder::{BuildError, DisplayRequest, RequestBuilder, ResolvedRequest};
pub use cache::{CacheEngine, CacheStrategy};
pub use config::WorkbenchConfig;
pub use environment::{EnvError, VariableStore};
pub use events::{DispatchEvent, EventBus};
pub use executor::{
    DispatchError, Dispatcher, DispatcherBuilder, ExecuteOptions, ReqwestTransport, Transport,
};
pub use models::{AuthSpec, BodySpec, HttpMethod, KeyValueEntry, NormalizedResponse, RequestSpec};
pub use retry::{ErrorKind, RequestFailure, RetryPolicy, RetryStrategy};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, SharedStorage};
pub use variables::TemplateResolver;

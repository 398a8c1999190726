//! Request building.
//!
//! A [`RequestSpec`] has two projections:
//!
//! - the **execution** projection ([`ResolvedRequest`]): tokens resolved, query
//!   percent-encoded, auth applied, body assembled. This is what the transport
//!   sends and it is never shown to the user.
//! - the **display** projection ([`DisplayRequest`]): the URL and headers as
//!   the user typed them. This is what logs and events carry.
//!
//! The two are produced by separate code paths; the display path never
//! touches the resolver.

pub mod body;
pub mod url;

pub use self::body::{apply_body, MultipartPart, RequestPayload};
pub use self::url::{build_display_url, build_execution_url, encode_component};

use crate::auth;
use crate::models::{AuthSpec, BodySpec, HttpMethod, KeyValueEntry, RequestSpec};
use crate::variables::TemplateResolver;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Errors that stop a request from being built
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("request URL is empty")]
    EmptyUrl,

    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Execution projection of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub method: HttpMethod,
    /// Resolved, percent-encoded URL including the query string
    pub url: String,
    pub headers: HashMap<String, String>,
    pub payload: RequestPayload,
    /// Resolved active query parameters, used for fingerprinting
    pub params: BTreeMap<String, String>,
}

/// Display projection of a request. Contains no resolved values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
}

/// Builds both projections of a [`RequestSpec`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    resolver: TemplateResolver,
    default_headers: HashMap<String, String>,
}

impl RequestBuilder {
    pub fn new(resolver: TemplateResolver) -> Self {
        Self {
            resolver,
            default_headers: HashMap::new(),
        }
    }

    /// Headers applied before the request's own headers.
    pub fn with_default_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.default_headers = headers;
        self
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    /// See [`build_display_url`].
    pub fn build_display_url(&self, url: &str, params: &[KeyValueEntry]) -> String {
        build_display_url(url, params)
    }

    /// See [`build_execution_url`].
    pub fn build_execution_url(&self, url: &str, params: &[KeyValueEntry]) -> String {
        build_execution_url(url, params, &self.resolver)
    }

    /// Resolves active header rows into a map. Later rows win over earlier
    /// rows with the same name.
    pub fn build_headers(&self, entries: &[KeyValueEntry]) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        for entry in entries.iter().filter(|entry| entry.is_active()) {
            headers.insert(
                self.resolver.resolve(&entry.key),
                self.resolver.resolve(&entry.value),
            );
        }
        headers
    }

    /// Sets `Authorization` from `auth`. See [`auth::apply_auth`].
    pub fn apply_auth(&self, headers: &mut HashMap<String, String>, auth: &AuthSpec) {
        auth::apply_auth(headers, auth, &self.resolver);
    }

    /// Assembles the payload for `body`. See [`body::apply_body`].
    pub fn apply_body(
        &self,
        headers: &mut HashMap<String, String>,
        body: &BodySpec,
    ) -> Result<RequestPayload, BuildError> {
        apply_body(headers, body, &self.resolver)
    }

    /// Builds the execution projection.
    ///
    /// # Arguments
    ///
    /// * `spec` - The request as composed by the user
    ///
    /// # Returns
    ///
    /// The resolved request, [`BuildError::EmptyUrl`] for a blank URL, or
    /// [`BuildError::Attachment`] when a file part cannot be read. Bodies are
    /// only built for POST, PUT and PATCH.
    pub fn build(&self, spec: &RequestSpec) -> Result<ResolvedRequest, BuildError> {
        if spec.url.trim().is_empty() {
            return Err(BuildError::EmptyUrl);
        }

        let url = self.build_execution_url(&spec.url, &spec.params);

        let mut headers = merge_case_insensitive(
            self.default_headers.clone(),
            self.build_headers(&spec.headers),
        );
        self.apply_auth(&mut headers, &spec.auth);

        let payload = if spec.method.allows_body() {
            self.apply_body(&mut headers, &spec.body)?
        } else {
            RequestPayload::Empty
        };

        let params = spec
            .params
            .iter()
            .filter(|param| param.is_active())
            .map(|param| {
                (
                    self.resolver.resolve(&param.key),
                    self.resolver.resolve(&param.value),
                )
            })
            .collect();

        Ok(ResolvedRequest {
            method: spec.method,
            url,
            headers,
            payload,
            params,
        })
    }

    /// Builds the display projection. Never resolves tokens.
    pub fn build_display(&self, spec: &RequestSpec) -> DisplayRequest {
        let literal: HashMap<String, String> = spec
            .headers
            .iter()
            .filter(|entry| entry.is_active())
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect();

        DisplayRequest {
            method: spec.method,
            url: build_display_url(&spec.url, &spec.params),
            headers: merge_case_insensitive(self.default_headers.clone(), literal),
        }
    }
}

/// Overlays `overrides` on `base`, treating header names case-insensitively.
fn merge_case_insensitive(
    mut base: HashMap<String, String>,
    overrides: HashMap<String, String>,
) -> HashMap<String, String> {
    for (name, value) in overrides {
        base.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        base.insert(name, value);
    }
    base
}

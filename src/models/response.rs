//! Normalized response model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Uniform response shape handed back to callers, whether it came from the
/// network or from the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    /// HTTP status code (e.g., 200, 404, 500)
    pub status: u16,

    /// HTTP status text (e.g., "OK", "Not Found")
    pub status_text: String,

    /// Response headers, names lower-cased
    pub headers: HashMap<String, String>,

    /// Parsed JSON body, or the body as a JSON string when it is not JSON
    pub data: serde_json::Value,

    /// Time from first send to the final response
    pub duration_ms: u64,

    /// Body size in bytes
    pub size_bytes: usize,

    /// `true` when served from the cache
    pub cached: bool,

    /// Identifier of the call that produced (or looked up) this response
    pub request_id: String,
}

impl NormalizedResponse {
    /// Builds a response from raw transport output.
    ///
    /// # Arguments
    ///
    /// * `status` - HTTP status code
    /// * `status_text` - Reason phrase
    /// * `headers` - Response headers (names are lower-cased here)
    /// * `body` - Raw body bytes
    /// * `duration` - Elapsed time of the exchange
    /// * `request_id` - Id of the originating call
    pub fn from_parts(
        status: u16,
        status_text: impl Into<String>,
        headers: HashMap<String, String>,
        body: &[u8],
        duration: Duration,
        request_id: impl Into<String>,
    ) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();

        Self {
            status,
            status_text: status_text.into(),
            headers,
            data: parse_body(body),
            duration_ms: duration.as_millis() as u64,
            size_bytes: body.len(),
            cached: false,
            request_id: request_id.into(),
        }
    }

    /// Copy of a cached response as seen by a new call.
    pub fn served_from_cache(&self, request_id: impl Into<String>) -> Self {
        Self {
            cached: true,
            duration_ms: 0,
            request_id: request_id.into(),
            ..self.clone()
        }
    }

    /// Checks if the response indicates success (2xx status code).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Interprets a body as JSON when it parses, otherwise as (lossy) text.
pub fn parse_body(body: &[u8]) -> serde_json::Value {
    if body.is_empty() {
        return serde_json::Value::String(String::new());
    }

    serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
}

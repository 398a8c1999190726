//! Request data models.
//!
//! A [`RequestSpec`] is the request exactly as the user composed it: templated
//! URL, ordered parameter and header rows that can be toggled on and off, an
//! auth descriptor and a body descriptor. The JSON layout mirrors the request
//! documents produced by the UI (`"type"` tags on auth and body).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HttpMethod {
    /// HTTP GET method - retrieve a resource
    #[default]
    #[serde(alias = "get")]
    GET,
    /// HTTP POST method - submit data to create a resource
    #[serde(alias = "post")]
    POST,
    /// HTTP PUT method - replace a resource
    #[serde(alias = "put")]
    PUT,
    /// HTTP PATCH method - partially modify a resource
    #[serde(alias = "patch")]
    PATCH,
    /// HTTP DELETE method - remove a resource
    #[serde(alias = "delete")]
    DELETE,
}

impl HttpMethod {
    /// Returns the string representation of the HTTP method.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
        }
    }

    /// Parses a string into an HttpMethod.
    ///
    /// # Arguments
    ///
    /// * `s` - A string slice representing the HTTP method
    ///
    /// # Returns
    ///
    /// `Some(HttpMethod)` if the string is a supported HTTP method, `None` otherwise.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "PATCH" => Some(HttpMethod::PATCH),
            "DELETE" => Some(HttpMethod::DELETE),
            _ => None,
        }
    }

    /// Whether a body is sent with this method (POST, PUT and PATCH).
    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH)
    }

    /// Whether responses to this method may be cached.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, HttpMethod::GET)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_enabled() -> bool {
    true
}

/// One row of the params, headers or url-encoded body tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueEntry {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl KeyValueEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }

    /// Same entry, switched off.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enabled rows with a non-blank key take part in a request.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.key.trim().is_empty()
    }
}

/// Kind of a multipart form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FormFieldKind {
    #[default]
    Text,
    File,
}

/// A file attached to a multipart form field.
///
/// Content comes from `path` when set, otherwise from the inline `bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bytes: Vec<u8>,
}

impl FileAttachment {
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            path: None,
            bytes,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            file_name,
            content_type: None,
            path: Some(path),
            bytes: Vec::new(),
        }
    }
}

/// One row of a multipart form body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDataEntry {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "type", default)]
    pub kind: FormFieldKind,
}

impl FormDataEntry {
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            files: Vec::new(),
            enabled: true,
            kind: FormFieldKind::Text,
        }
    }

    pub fn file(key: impl Into<String>, files: Vec<FileAttachment>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            files,
            enabled: true,
            kind: FormFieldKind::File,
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.key.trim().is_empty()
    }
}

/// Authentication descriptor. Unknown `type` values deserialize to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthSpec {
    Basic {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    Bearer {
        #[serde(default)]
        token: String,
    },
    #[serde(rename = "oauth2")]
    OAuth2 {
        #[serde(rename = "accessToken", default)]
        access_token: String,
    },
    #[default]
    #[serde(other)]
    None,
}

/// Body descriptor. Unknown `type` values deserialize to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum BodySpec {
    #[serde(rename = "raw")]
    Raw {
        #[serde(default)]
        content: String,
    },
    #[serde(rename = "form-data")]
    FormData {
        #[serde(default)]
        entries: Vec<FormDataEntry>,
    },
    #[serde(rename = "x-www-form-urlencoded", alias = "urlencoded")]
    UrlEncoded {
        #[serde(default)]
        entries: Vec<KeyValueEntry>,
    },
    #[default]
    #[serde(rename = "none", other)]
    None,
}

/// A request as composed by the user, before any token resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestSpec {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE).
    #[serde(default)]
    pub method: HttpMethod,

    /// Target URL. May contain `{{variableName}}` tokens.
    #[serde(default)]
    pub url: String,

    /// Query parameter rows, in display order.
    #[serde(default)]
    pub params: Vec<KeyValueEntry>,

    /// Header rows, in display order.
    #[serde(default)]
    pub headers: Vec<KeyValueEntry>,

    #[serde(default)]
    pub auth: AuthSpec,

    #[serde(default)]
    pub body: BodySpec,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::GET, url)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(KeyValueEntry::new(key, value));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(KeyValueEntry::new(key, value));
        self
    }

    pub fn with_auth(mut self, auth: AuthSpec) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_body(mut self, body: BodySpec) -> Self {
        self.body = body;
        self
    }
}

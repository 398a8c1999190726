//! Request body assembly.

use super::BuildError;
use crate::models::{BodySpec, FileAttachment, FormDataEntry, FormFieldKind, KeyValueEntry};
use crate::variables::TemplateResolver;
use std::collections::HashMap;
use std::fs;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

impl MultipartPart {
    pub fn name(&self) -> &str {
        match self {
            MultipartPart::Text { name, .. } | MultipartPart::File { name, .. } => name,
        }
    }
}

/// Body ready to be handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestPayload {
    #[default]
    Empty,
    /// Raw text, sent as-is
    Text(String),
    /// Already form-encoded `key=value&...` string
    UrlEncoded(String),
    /// Multipart parts; the transport picks the boundary
    Multipart(Vec<MultipartPart>),
}

impl RequestPayload {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestPayload::Empty)
    }

    /// Structural value used when fingerprinting the request.
    ///
    /// Raw bodies that parse as JSON are compared by structure, so key order
    /// does not matter. File parts contribute their name and size.
    pub fn fingerprint_value(&self) -> serde_json::Value {
        use serde_json::{json, Value};

        match self {
            RequestPayload::Empty => Value::Null,
            RequestPayload::Text(text) => {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
            }
            RequestPayload::UrlEncoded(encoded) => Value::String(encoded.clone()),
            RequestPayload::Multipart(parts) => Value::Array(
                parts
                    .iter()
                    .map(|part| match part {
                        MultipartPart::Text { name, value } => json!({ "name": name, "value": value }),
                        MultipartPart::File {
                            name,
                            file_name,
                            bytes,
                            ..
                        } => json!({ "name": name, "fileName": file_name, "size": bytes.len() }),
                    })
                    .collect(),
            ),
        }
    }
}

fn remove_header(headers: &mut HashMap<String, String>, name: &str) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
}

fn has_header(headers: &HashMap<String, String>, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

/// Builds the payload for `body` and adjusts `headers` to match.
///
/// # Arguments
///
/// * `headers` - Header map of the request being built
/// * `body` - Body descriptor from the request
/// * `resolver` - Resolver applied to text content, keys and values
///
/// # Returns
///
/// The payload, or [`BuildError::Attachment`] when a file part cannot be read.
///
/// Raw bodies that are valid JSON get `Content-Type: application/json` unless
/// a content type was already set. Multipart bodies drop any explicit
/// content type. Url-encoded bodies always set it.
pub fn apply_body(
    headers: &mut HashMap<String, String>,
    body: &BodySpec,
    resolver: &TemplateResolver,
) -> Result<RequestPayload, BuildError> {
    match body {
        BodySpec::None => Ok(RequestPayload::Empty),
        BodySpec::Raw { content } => {
            let text = resolver.resolve(content);
            if !has_header(headers, CONTENT_TYPE)
                && serde_json::from_str::<serde_json::Value>(&text).is_ok()
            {
                headers.insert(CONTENT_TYPE.to_string(), "application/json".to_string());
            }
            Ok(RequestPayload::Text(text))
        }
        BodySpec::FormData { entries } => {
            let parts = build_multipart(entries, resolver)?;
            remove_header(headers, CONTENT_TYPE);
            Ok(RequestPayload::Multipart(parts))
        }
        BodySpec::UrlEncoded { entries } => {
            let encoded = build_urlencoded(entries, resolver);
            remove_header(headers, CONTENT_TYPE);
            headers.insert(CONTENT_TYPE.to_string(), FORM_URLENCODED.to_string());
            Ok(RequestPayload::UrlEncoded(encoded))
        }
    }
}

fn build_urlencoded(entries: &[KeyValueEntry], resolver: &TemplateResolver) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for entry in entries.iter().filter(|entry| entry.is_active()) {
        serializer.append_pair(&resolver.resolve(&entry.key), &resolver.resolve(&entry.value));
    }
    serializer.finish()
}

fn build_multipart(
    entries: &[FormDataEntry],
    resolver: &TemplateResolver,
) -> Result<Vec<MultipartPart>, BuildError> {
    let mut parts = Vec::new();

    for entry in entries.iter().filter(|entry| entry.is_active()) {
        let name = resolver.resolve(&entry.key);
        match entry.kind {
            FormFieldKind::File => {
                for file in &entry.files {
                    parts.push(MultipartPart::File {
                        name: name.clone(),
                        file_name: file.file_name.clone(),
                        content_type: file.content_type.clone(),
                        bytes: read_attachment(file)?,
                    });
                }
            }
            FormFieldKind::Text => parts.push(MultipartPart::Text {
                name,
                value: resolver.resolve(&entry.value),
            }),
        }
    }

    Ok(parts)
}

fn read_attachment(file: &FileAttachment) -> Result<Vec<u8>, BuildError> {
    match &file.path {
        Some(path) => fs::read(path).map_err(|source| BuildError::Attachment {
            path: path.clone(),
            source,
        }),
        None => Ok(file.bytes.clone()),
    }
}

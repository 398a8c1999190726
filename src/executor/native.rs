//! Native HTTP transport using reqwest.
//!
//! This is the production [`Transport`]: it owns one `reqwest::Client`
//! configured from [`WorkbenchConfig`] and maps each [`ResolvedRequest`] onto
//! it, including multipart bodies.

use super::transport::{SendOptions, Transport, TransportError, TransportResponse};
use crate::builder::{MultipartPart, RequestPayload, ResolvedRequest};
use crate::config::WorkbenchConfig;
use crate::models::HttpMethod;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use std::collections::HashMap;

/// Convert reqwest errors to TransportError.
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        // Messages never contain the resolved URL.
        let err = err.without_url();
        if err.is_builder() {
            TransportError::invalid(err.to_string())
        } else if err.is_timeout() {
            TransportError::timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::network(format!("Connection failed: {}", err))
        } else {
            TransportError::network(err.to_string())
        }
    }
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client honoring the timeout, redirect and TLS settings of
    /// `config`.
    pub fn new(config: &WorkbenchConfig) -> Result<Self, TransportError> {
        let redirect = if config.follow_redirects {
            Policy::limited(config.max_redirects as usize)
        } else {
            Policy::none()
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout_duration())
            .redirect(redirect)
            .danger_accept_invalid_certs(!config.validate_ssl)
            .build()
            .map_err(|e| TransportError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::GET => reqwest::Method::GET,
        HttpMethod::POST => reqwest::Method::POST,
        HttpMethod::PUT => reqwest::Method::PUT,
        HttpMethod::PATCH => reqwest::Method::PATCH,
        HttpMethod::DELETE => reqwest::Method::DELETE,
    }
}

fn multipart_form(parts: &[MultipartPart]) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            MultipartPart::Text { name, value } => form.text(name.clone(), value.clone()),
            MultipartPart::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                let mut file_part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(content_type) = content_type {
                    file_part = file_part.mime_str(content_type)?;
                }
                form.part(name.clone(), file_part)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        options: &SendOptions,
    ) -> Result<TransportResponse, TransportError> {
        let mut req_builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .timeout(options.timeout);

        for (name, value) in &request.headers {
            req_builder = req_builder.header(name.as_str(), value.as_str());
        }

        req_builder = match &request.payload {
            RequestPayload::Empty => req_builder,
            RequestPayload::Text(text) => req_builder.body(text.clone()),
            RequestPayload::UrlEncoded(encoded) => req_builder.body(encoded.clone()),
            RequestPayload::Multipart(parts) => req_builder.multipart(multipart_form(parts)?),
        };

        let response = req_builder.send().await?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("").to_string();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                headers.insert(name.as_str().to_string(), value_str.to_string());
            }
        }

        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text,
            headers,
            body,
        })
    }
}

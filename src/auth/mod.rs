//! Request authentication.
//!
//! Turns an [`AuthSpec`] into an `Authorization` header. Credentials are
//! resolved through the [`TemplateResolver`] first, so `{{token}}` style
//! references work in every field.

use crate::models::AuthSpec;
use crate::variables::TemplateResolver;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;

pub const AUTHORIZATION: &str = "Authorization";

/// Encodes username and password into a Basic authentication header value.
///
/// # Examples
///
/// ```
/// use api_workbench::auth::basic_auth;
///
/// assert_eq!(basic_auth("a", "b"), "Basic YTpi");
/// ```
pub fn basic_auth(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
}

/// Formats a token into a Bearer authentication header value.
pub fn bearer_token(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Computes the `Authorization` value for `auth`, if any.
///
/// # Arguments
///
/// * `auth` - The authentication descriptor from the request
/// * `resolver` - Resolver applied to every credential field
///
/// # Returns
///
/// `None` for [`AuthSpec::None`], for Basic with both fields empty and for
/// Bearer/OAuth2 with an empty token.
pub fn authorization_value(auth: &AuthSpec, resolver: &TemplateResolver) -> Option<String> {
    match auth {
        AuthSpec::None => None,
        AuthSpec::Basic { username, password } => {
            let username = resolver.resolve(username);
            let password = resolver.resolve(password);
            if username.is_empty() && password.is_empty() {
                None
            } else {
                Some(basic_auth(&username, &password))
            }
        }
        AuthSpec::Bearer { token } | AuthSpec::OAuth2 { access_token: token } => {
            let token = resolver.resolve(token);
            if token.is_empty() {
                None
            } else {
                Some(bearer_token(&token))
            }
        }
    }
}

/// Applies `auth` to a header map, replacing any existing `Authorization`
/// header regardless of its case. A descriptor that yields no value leaves
/// the headers untouched.
pub fn apply_auth(
    headers: &mut HashMap<String, String>,
    auth: &AuthSpec,
    resolver: &TemplateResolver,
) {
    if let Some(value) = authorization_value(auth, resolver) {
        set_authorization(headers, value);
    }
}

fn set_authorization(headers: &mut HashMap<String, String>, value: String) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(AUTHORIZATION));
    headers.insert(AUTHORIZATION.to_string(), value);
}

//! URL assembly for the display and execution projections.
//!
//! The two builders are deliberately independent: the display URL is what a
//! person sees (tokens intact, nothing encoded), the execution URL is what goes
//! over the wire (tokens resolved, keys and values percent-encoded).

use crate::models::KeyValueEntry;
use crate::variables::TemplateResolver;

/// Percent-encodes a query component. Spaces become `%20`, not `+`.
pub fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn join_query(base: &str, pairs: &[String]) -> String {
    if pairs.is_empty() {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, pairs.join("&"))
}

/// Builds the URL shown to the user.
///
/// # Arguments
///
/// * `url` - The URL as typed, possibly containing tokens
/// * `params` - Query parameter rows; only active rows are used
///
/// # Returns
///
/// `url` followed by literal `key=value` pairs, or an empty string when `url`
/// is blank.
pub fn build_display_url(url: &str, params: &[KeyValueEntry]) -> String {
    if url.trim().is_empty() {
        return String::new();
    }

    let pairs: Vec<String> = params
        .iter()
        .filter(|param| param.is_active())
        .map(|param| format!("{}={}", param.key, param.value))
        .collect();

    join_query(url, &pairs)
}

/// Builds the URL that is actually requested.
///
/// The base URL and every active parameter key and value are resolved, then
/// each key and value is percent-encoded. Returns an empty string when `url`
/// is blank.
pub fn build_execution_url(
    url: &str,
    params: &[KeyValueEntry],
    resolver: &TemplateResolver,
) -> String {
    if url.trim().is_empty() {
        return String::new();
    }

    let base = resolver.resolve(url);
    let pairs: Vec<String> = params
        .iter()
        .filter(|param| param.is_active())
        .map(|param| {
            format!(
                "{}={}",
                encode_component(&resolver.resolve(&param.key)),
                encode_component(&resolver.resolve(&param.value))
            )
        })
        .collect();

    join_query(&base, &pairs)
}

//! Environment-backed configuration helpers
//!
//! Nothing in the crate reads the environment on its own. Applications that
//! want environment configuration call these helpers while building
//! [`SessionOptions`](crate::SessionOptions).

use std::env;

/// Variable holding the streaming endpoint URL
pub const ENDPOINT_VAR: &str = "STRUCTURED_STREAM_ENDPOINT";

/// Variable holding the bearer token
pub const API_KEY_VAR: &str = "STRUCTURED_STREAM_API_KEY";

/// Get the endpoint from the environment or a fallback
///
/// Priority:
/// 1. `STRUCTURED_STREAM_ENDPOINT` environment variable (if non-empty)
/// 2. fallback parameter
///
/// # Examples
///
/// ```rust,no_run
/// use structured_stream::get_endpoint;
///
/// let endpoint = get_endpoint(Some("http://localhost:8080/v1/responses"));
/// ```
pub fn get_endpoint(fallback: Option<&str>) -> Option<String> {
    resolve(env::var(ENDPOINT_VAR).ok(), fallback)
}

/// Get the API key from the environment, or an empty key
///
/// An empty key sends no `Authorization` header.
pub fn get_api_key() -> String {
    env::var(API_KEY_VAR).unwrap_or_default()
}

fn resolve(from_env: Option<String>, fallback: Option<&str>) -> Option<String> {
    from_env
        .filter(|value| !value.trim().is_empty())
        .or_else(|| fallback.map(str::to_string))
}

//! Shared HTTP client construction.

use std::time::Duration;

use thiserror::Error;

/// `User-Agent` sent by every adapter.
pub const USER_AGENT: &str = concat!("genflow/", env!("CARGO_PKG_VERSION"));

/// An adapter could not be constructed.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured base URL is not an absolute http(s) URL.
    #[error("Invalid base URL '{url}': expected an absolute http:// or https:// URL")]
    InvalidBaseUrl {
        /// The rejected value.
        url: String,
    },

    /// The underlying HTTP client could not be built (TLS backend failure).
    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Trims whitespace and trailing slashes, then checks that what is left
/// parses as an http(s) URL with a host.
pub fn normalize_base_url(url: &str) -> Result<String, ClientError> {
    let trimmed = url.trim().trim_end_matches('/');
    let valid = reqwest::Url::parse(trimmed).is_ok_and(|parsed| {
        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some_and(|host| !host.is_empty())
    });
    if !valid {
        return Err(ClientError::InvalidBaseUrl {
            url: url.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Builds a client with the given whole-request timeout.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

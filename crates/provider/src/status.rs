//! Mapping of HTTP failures onto the [`ProviderError`] taxonomy.
//!
//! | Signal | Error |
//! |--------|-------|
//! | 429, `RESOURCE_EXHAUSTED` | `RateLimit` (with `Retry-After` / `RetryInfo` hint) |
//! | 401, 402, 403, `API_KEY_INVALID`, `PERMISSION_DENIED`, `UNAUTHENTICATED`, quota messages | `AuthQuota` |
//! | 5xx | `Server` |
//! | 400 mentioning an unsupported feature | `CapabilityMismatch` |
//! | any other status | `Validation` |
//!
//! Transport failures (connect, reset, timeout) are always `Network`.

use std::time::Duration;

use domain::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::Value;

/// Lower-cased message fragments that mean the model rejected a feature
/// rather than the request content.
const CAPABILITY_PATTERNS: &[&str] = &[
    "not supported",
    "is not enabled for this model",
    "response modalities",
    "tool use",
];

const AUTH_MARKERS: &[&str] = &["API_KEY_INVALID", "PERMISSION_DENIED", "UNAUTHENTICATED"];

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

impl ErrorBody {
    /// `reason` fields of `ErrorInfo` details.
    fn reasons(&self) -> impl Iterator<Item = &str> {
        self.details
            .iter()
            .filter_map(|d| d.get("reason").and_then(Value::as_str))
    }

    /// `retryDelay` of a `RetryInfo` detail, e.g. `"12s"` or `"0.5s"`.
    fn retry_delay(&self) -> Option<Duration> {
        self.details
            .iter()
            .filter_map(|d| d.get("retryDelay").and_then(Value::as_str))
            .find_map(parse_duration_secs)
    }

    fn has_marker(&self, marker: &str) -> bool {
        self.status.as_deref() == Some(marker) || self.reasons().any(|r| r == marker)
    }
}

/// Maps a non-success response onto the error taxonomy.
///
/// `body` is the raw response text; it does not need to be JSON.
pub fn map_error_response(status: u16, retry_after: Option<Duration>, body: &str) -> ProviderError {
    let parsed: ErrorBody = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .unwrap_or_default();
    let message = if parsed.message.is_empty() {
        fallback_message(status, body)
    } else {
        parsed.message.clone()
    };
    let lowered = message.to_lowercase();

    if status == 429 || parsed.has_marker("RESOURCE_EXHAUSTED") {
        return ProviderError::RateLimit {
            message,
            retry_after: retry_after.or_else(|| parsed.retry_delay()),
        };
    }

    if matches!(status, 401 | 402 | 403)
        || AUTH_MARKERS.iter().any(|m| parsed.has_marker(m))
        || lowered.contains("quota")
    {
        return ProviderError::AuthQuota { status, message };
    }

    if (500..=599).contains(&status) {
        return ProviderError::Server { status, message };
    }

    if status == 400 && CAPABILITY_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return ProviderError::CapabilityMismatch { message };
    }

    ProviderError::Validation { message }
}

/// Maps a transport-level failure.
pub fn map_transport_error(err: &reqwest::Error) -> ProviderError {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    ProviderError::Network { message }
}

/// Reads a delta-seconds `Retry-After` header. HTTP-date values are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn parse_duration_secs(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().strip_suffix('s')?.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn fallback_message(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        let snippet: String = body.chars().take(200).collect();
        format!("HTTP {status}: {snippet}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn body(code: u16, status: &str, message: &str) -> String {
        json!({ "error": { "code": code, "status": status, "message": message } }).to_string()
    }

    #[test]
    fn test_429_is_rate_limit_with_header_hint() {
        let err = map_error_response(
            429,
            Some(Duration::from_secs(7)),
            &body(429, "RESOURCE_EXHAUSTED", "Resource has been exhausted"),
        );
        assert_eq!(
            err,
            ProviderError::RateLimit {
                message: "Resource has been exhausted".into(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
    }

    #[test]
    fn test_retry_info_detail_supplies_hint_when_header_missing() {
        let raw = json!({
            "error": {
                "code": 429,
                "status": "RESOURCE_EXHAUSTED",
                "message": "slow down",
                "details": [
                    { "@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "12s" }
                ]
            }
        })
        .to_string();
        let err = map_error_response(429, None, &raw);
        assert!(matches!(
            err,
            ProviderError::RateLimit { retry_after: Some(d), .. } if d == Duration::from_secs(12)
        ));
    }

    #[test]
    fn test_auth_and_quota_failures() {
        assert!(matches!(
            map_error_response(403, None, &body(403, "PERMISSION_DENIED", "denied")),
            ProviderError::AuthQuota { status: 403, .. }
        ));
        assert!(matches!(
            map_error_response(401, None, ""),
            ProviderError::AuthQuota { status: 401, .. }
        ));

        let invalid_key = json!({
            "error": {
                "code": 400,
                "status": "INVALID_ARGUMENT",
                "message": "API key not valid. Please pass a valid API key.",
                "details": [ { "reason": "API_KEY_INVALID" } ]
            }
        })
        .to_string();
        assert!(matches!(
            map_error_response(400, None, &invalid_key),
            ProviderError::AuthQuota { status: 400, .. }
        ));

        assert!(matches!(
            map_error_response(400, None, &body(400, "FAILED_PRECONDITION", "Quota exceeded for project")),
            ProviderError::AuthQuota { .. }
        ));
    }

    #[test]
    fn test_5xx_is_server_error() {
        let err = map_error_response(503, None, "upstream unavailable");
        assert_eq!(
            err,
            ProviderError::Server {
                status: 503,
                message: "HTTP 503: upstream unavailable".into(),
            }
        );
    }

    #[test]
    fn test_capability_patterns_on_400() {
        for message in [
            "JSON mode is not enabled for this model",
            "Search Grounding is not supported.",
            "Tool use with function calling is unsupported",
            "Model does not support the requested response modalities: image",
        ] {
            let err = map_error_response(400, None, &body(400, "INVALID_ARGUMENT", message));
            assert!(
                err.is_capability_mismatch(),
                "expected capability mismatch for {message:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_other_4xx_is_validation() {
        let err = map_error_response(400, None, &body(400, "INVALID_ARGUMENT", "contents is empty"));
        assert!(matches!(err, ProviderError::Validation { .. }));
        let err = map_error_response(404, None, &body(404, "NOT_FOUND", "models/nope is not found"));
        assert!(matches!(err, ProviderError::Validation { .. }));
    }

    #[test]
    fn test_retry_after_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(30)));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_fractional_retry_delay() {
        assert_eq!(parse_duration_secs("0.5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration_secs("12"), None);
        assert_eq!(parse_duration_secs("-1s"), None);
    }
}

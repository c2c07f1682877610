//! Error taxonomy and retry classification for generation calls.
//!
//! [`ProviderError`] is what an infrastructure adapter reports for one failed
//! provider call. [`ErrorClass`] is the cross-cutting retry decision: any error
//! that participates in rotation or retry must be able to produce one.
//!
//! [`GenerationError`] is what escapes the request executor and the capability
//! negotiator; the batch pipeline converts it into an `error` job item.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a failure can be recovered from by trying again elsewhere.
///
/// ## Rules
///
/// - `Recoverable`: rate limits, 5xx, transport failures, and auth/quota
///   failures tied to the credential that was used. Recovery means rotating
///   to a different credential, not repeating the same one.
/// - `Fatal`: request-shaped failures (validation, unsupported capability)
///   that no other credential can fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Rotate and try again.
    Recoverable {
        /// Minimum back-off before retrying, when the provider supplied one
        /// (e.g. from a `Retry-After` header).
        after: Option<Duration>,
    },
    /// Propagate immediately.
    Fatal,
}

impl ErrorClass {
    /// Returns `true` for [`ErrorClass::Recoverable`].
    pub fn is_recoverable(self) -> bool {
        matches!(self, ErrorClass::Recoverable { .. })
    }
}

// ---------------------------------------------------------------------------
// Provider errors
// ---------------------------------------------------------------------------

/// One failed provider call, as reported by an infrastructure adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderError {
    /// The provider throttled the request.
    #[error("Rate limited: {message}")]
    RateLimit {
        /// Provider message.
        message: String,
        /// Back-off requested by the provider, if any.
        retry_after: Option<Duration>,
    },

    /// The provider failed on its side (HTTP 5xx or equivalent).
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// The request never completed (connect failure, timeout, reset).
    #[error("Network error: {message}")]
    Network {
        /// Transport error description.
        message: String,
    },

    /// The credential was rejected or has run out of quota.
    #[error("Authorization or quota failure ({status}): {message}")]
    AuthQuota {
        /// HTTP status code.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// The request itself is invalid, independent of the credential.
    #[error("Validation error: {message}")]
    Validation {
        /// Provider message.
        message: String,
    },

    /// The selected model does not support a requested capability.
    #[error("Capability not supported: {message}")]
    CapabilityMismatch {
        /// Provider message.
        message: String,
    },
}

impl ProviderError {
    /// The standard classification of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::RateLimit { retry_after, .. } => ErrorClass::Recoverable {
                after: *retry_after,
            },
            ProviderError::Server { .. }
            | ProviderError::Network { .. }
            | ProviderError::AuthQuota { .. } => ErrorClass::Recoverable { after: None },
            ProviderError::Validation { .. } | ProviderError::CapabilityMismatch { .. } => {
                ErrorClass::Fatal
            }
        }
    }

    /// Returns `true` if this error signals an unsupported capability.
    pub fn is_capability_mismatch(&self) -> bool {
        matches!(self, ProviderError::CapabilityMismatch { .. })
    }

    /// Short machine-friendly label used in log fields and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::RateLimit { .. } => "rate_limit",
            ProviderError::Server { .. } => "server",
            ProviderError::Network { .. } => "network",
            ProviderError::AuthQuota { .. } => "auth_quota",
            ProviderError::Validation { .. } => "validation",
            ProviderError::CapabilityMismatch { .. } => "capability_mismatch",
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier port
// ---------------------------------------------------------------------------

/// Decides whether a provider failure should trigger rotation or abort.
///
/// The request executor consults a classifier after every failed attempt.
/// Swap the implementation to tighten or loosen the policy (e.g. treat
/// server errors as fatal for a provider known to fail deterministically).
pub trait ErrorClassifier: Send + Sync {
    /// Classifies one failure.
    fn classify(&self, error: &ProviderError) -> ErrorClass;
}

/// Classifier applying [`ProviderError::class`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardClassifier;

impl ErrorClassifier for StandardClassifier {
    fn classify(&self, error: &ProviderError) -> ErrorClass {
        error.class()
    }
}

// ---------------------------------------------------------------------------
// Errors escaping the executor / negotiator
// ---------------------------------------------------------------------------

/// A logical generation call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum GenerationError {
    /// A fatal provider error propagated without further attempts.
    #[error(transparent)]
    Provider(ProviderError),

    /// Every credential was tried and each failed recoverably.
    #[error("Credential pool exhausted after {attempts} attempt(s); last error: {last}")]
    PoolExhausted {
        /// Provider calls made before giving up.
        attempts: usize,
        /// The final underlying error, kept for diagnostics.
        last: ProviderError,
    },

    /// The batch was cancelled before this call finished.
    #[error("Cancelled")]
    Cancelled,

    /// The batch deadline passed before this call finished.
    #[error("Batch deadline exceeded")]
    DeadlineExceeded,
}

impl GenerationError {
    /// Returns `true` if retrying the same logical call later might succeed.
    ///
    /// Only pool exhaustion qualifies: every credential failed for reasons
    /// tied to load or the credential itself. Fatal provider errors and
    /// cancellation never qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::PoolExhausted { .. })
    }

    /// Back-off hint carried by the underlying provider error, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::PoolExhausted { last, .. } => match last.class() {
                ErrorClass::Recoverable { after } => after,
                ErrorClass::Fatal => None,
            },
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Relay errors
// ---------------------------------------------------------------------------

/// The asset relay could not re-host an asset.
///
/// Always absorbed by the batch pipeline; the original reference is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The relay endpoint could not be reached or timed out.
    #[error("Relay transport failure: {0}")]
    Transport(String),

    /// The relay answered with a non-success HTTP status.
    #[error("Relay returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The relay answered with `success: false`.
    #[error("Relay rejected the asset: {0}")]
    Rejected(String),

    /// The relay response did not have the expected structure.
    #[error("Malformed relay response: {0}")]
    Malformed(String),

    /// The reference cannot be relayed (e.g. it is already embedded).
    #[error("Asset reference is not relayable")]
    NotRelayable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_recoverable_with_hint() {
        let err = ProviderError::RateLimit {
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(
            err.class(),
            ErrorClass::Recoverable {
                after: Some(Duration::from_secs(7))
            }
        );
    }

    #[test]
    fn test_credential_tied_failures_are_recoverable() {
        let auth = ProviderError::AuthQuota {
            status: 403,
            message: "quota".into(),
        };
        let server = ProviderError::Server {
            status: 503,
            message: "unavailable".into(),
        };
        let net = ProviderError::Network {
            message: "reset".into(),
        };
        for err in [auth, server, net] {
            assert!(StandardClassifier.classify(&err).is_recoverable(), "{err}");
        }
    }

    #[test]
    fn test_request_shaped_failures_are_fatal() {
        let validation = ProviderError::Validation {
            message: "bad".into(),
        };
        let mismatch = ProviderError::CapabilityMismatch {
            message: "no tools".into(),
        };
        assert_eq!(StandardClassifier.classify(&validation), ErrorClass::Fatal);
        assert_eq!(StandardClassifier.classify(&mismatch), ErrorClass::Fatal);
        assert!(mismatch.is_capability_mismatch());
        assert!(!validation.is_capability_mismatch());
    }

    #[test]
    fn test_only_pool_exhaustion_is_transient() {
        let exhausted = GenerationError::PoolExhausted {
            attempts: 3,
            last: ProviderError::RateLimit {
                message: "x".into(),
                retry_after: Some(Duration::from_secs(2)),
            },
        };
        assert!(exhausted.is_transient());
        assert_eq!(exhausted.retry_after(), Some(Duration::from_secs(2)));

        let fatal = GenerationError::Provider(ProviderError::Validation {
            message: "x".into(),
        });
        assert!(!fatal.is_transient());
        assert!(!GenerationError::Cancelled.is_transient());
    }

    #[test]
    fn test_pool_exhausted_message_names_last_error() {
        let err = GenerationError::PoolExhausted {
            attempts: 2,
            last: ProviderError::Server {
                status: 500,
                message: "boom".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("2 attempt"));
        assert!(msg.contains("boom"));
    }
}

//! Provider credentials.
//!
//! A [`Credential`] wraps an opaque secret. The secret itself is only ever
//! handed to infrastructure adapters through [`Credential::expose_secret`];
//! everything that may end up in a log line uses the fingerprint (the last
//! four characters) instead.

use std::sync::Arc;

/// Number of trailing characters of the secret kept in the fingerprint.
const FINGERPRINT_LEN: usize = 4;

/// One provider access secret.
///
/// Immutable once loaded. Cloning is cheap (the secret is reference counted),
/// which lets the request executor hand each attempt its own owned copy.
///
/// `Debug` and `Display` both render the fingerprint only.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    secret: Arc<str>,
}

impl Credential {
    /// Creates a credential, returning `None` if the secret is blank.
    ///
    /// Surrounding whitespace is trimmed.
    pub fn new(secret: impl AsRef<str>) -> Option<Self> {
        let trimmed = secret.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self {
                secret: Arc::from(trimmed),
            })
        }
    }

    /// Splits a comma-joined credential string into individual credentials.
    ///
    /// Blank segments are skipped and duplicates removed while preserving the
    /// order of first appearance.
    pub fn parse_joined(joined: &str) -> Vec<Self> {
        let mut out: Vec<Self> = Vec::new();
        for cred in joined.split(',').filter_map(Self::new) {
            if !out.contains(&cred) {
                out.push(cred);
            }
        }
        out
    }

    /// Returns the raw secret. Only infrastructure adapters should call this.
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }

    /// Returns a log-safe identity derived from the last characters of the secret.
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.secret.chars().collect();
        let start = chars.len().saturating_sub(FINGERPRINT_LEN);
        let tail: String = chars[start..].iter().collect();
        format!("…{tail}")
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&self.fingerprint()).finish()
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

//! Round-robin credential pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use domain::Credential;
use thiserror::Error;

/// The pool could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No usable credential was supplied.
    #[error("Credential pool requires at least one credential")]
    Empty,
}

/// An ordered, non-empty set of credentials with a shared rotation cursor.
///
/// [`CredentialPool::next`] returns `credentials[cursor % len]` and advances
/// the cursor by exactly one. The cursor never regresses. It is an atomic so
/// the pool can be shared across tasks on a multi-threaded runtime.
///
/// Built once per session and shared by reference (usually `Arc`) with the
/// request executor; never shrinks at runtime.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Builds a pool from an ordered list of credentials.
    pub fn new(credentials: Vec<Credential>) -> Result<Self, PoolError> {
        if credentials.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Builds a pool from a comma-joined credential string.
    pub fn from_joined(joined: &str) -> Result<Self, PoolError> {
        Self::new(Credential::parse_joined(joined))
    }

    /// Returns the credential under the cursor and advances the cursor.
    pub fn next(&self) -> Credential {
        let position = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.credentials[position % self.credentials.len()].clone()
    }

    /// Number of credentials in the pool.
    pub fn size(&self) -> usize {
        self.credentials.len()
    }

    /// Total rotation steps taken so far.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Fingerprints of every credential, in rotation order.
    pub fn fingerprints(&self) -> Vec<String> {
        self.credentials.iter().map(Credential::fingerprint).collect()
    }
}

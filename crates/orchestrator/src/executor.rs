//! Credential-rotating request executor.
//!
//! [`RequestExecutor::run`] drives one logical provider call over the
//! credential pool:
//!
//! 1. If the caller supplied an override credential, try it once.
//! 2. Otherwise (or if the override failed recoverably) take up to
//!    `pool.size()` credentials from the pool, one per attempt.
//! 3. Return the first success. A fatal failure propagates immediately and
//!    consumes no further credentials.
//! 4. If every attempt failed recoverably, fail with
//!    [`GenerationError::PoolExhausted`] carrying the last underlying error.
//!
//! Total provider calls are therefore bounded by `pool.size()` plus one for
//! the override.

use std::future::Future;
use std::sync::Arc;

use domain::{Credential, ErrorClass, ErrorClassifier, GenerationError, ProviderError, StandardClassifier};
use tracing::{debug, warn};

use crate::CredentialPool;

/// Runs provider work with credential rotation and error classification.
#[derive(Clone)]
pub struct RequestExecutor {
    pool: Arc<CredentialPool>,
    classifier: Arc<dyn ErrorClassifier>,
}

impl RequestExecutor {
    /// Creates an executor over `pool` using [`StandardClassifier`].
    pub fn new(pool: Arc<CredentialPool>) -> Self {
        Self {
            pool,
            classifier: Arc::new(StandardClassifier),
        }
    }

    /// Replaces the error classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// The pool this executor rotates over.
    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Upper bound on provider calls for one [`RequestExecutor::run`].
    pub fn max_attempts(&self, has_override: bool) -> usize {
        self.pool.size() + usize::from(has_override)
    }

    /// Runs `work` until it succeeds, fails fatally, or the pool is exhausted.
    ///
    /// `work` performs exactly one provider call with the credential it is
    /// given.
    pub async fn run<T, F, Fut>(
        &self,
        override_credential: Option<&Credential>,
        mut work: F,
    ) -> Result<T, GenerationError>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempts = 0usize;
        let mut last: Option<ProviderError> = None;

        if let Some(credential) = override_credential {
            attempts += 1;
            debug!(credential = %credential, "Trying override credential");
            match work(credential.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    self.absorb(err, credential, attempts, &mut last)?;
                }
            }
        }

        for _ in 0..self.pool.size() {
            let credential = self.pool.next();
            attempts += 1;
            debug!(credential = %credential, attempt = attempts, "Issuing provider call");
            match work(credential.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    self.absorb(err, &credential, attempts, &mut last)?;
                }
            }
        }

        // The pool is never empty, so at least one failure was recorded.
        let last = last.unwrap_or(ProviderError::Validation {
            message: "credential pool is empty".to_string(),
        });
        warn!(attempts, last_error = %last, "Credential pool exhausted");
        Err(GenerationError::PoolExhausted { attempts, last })
    }

    /// Classifies a failed attempt: recoverable errors are remembered and the
    /// loop continues, fatal errors end the run.
    fn absorb(
        &self,
        err: ProviderError,
        credential: &Credential,
        attempt: usize,
        last: &mut Option<ProviderError>,
    ) -> Result<(), GenerationError> {
        match self.classifier.classify(&err) {
            ErrorClass::Recoverable { .. } => {
                warn!(
                    credential = %credential,
                    attempt,
                    kind = err.kind(),
                    error = %err,
                    "Recoverable provider failure, rotating credential"
                );
                *last = Some(err);
                Ok(())
            }
            ErrorClass::Fatal => {
                debug!(
                    credential = %credential,
                    attempt,
                    kind = err.kind(),
                    "Fatal provider failure, not rotating"
                );
                Err(GenerationError::Provider(err))
            }
        }
    }
}

//! Enhanced-then-baseline capability negotiation.
//!
//! A logical call is first issued in [`RequestMode::Enhanced`] (requested
//! capabilities included). If the provider rejects it with a
//! capability-mismatch error, it is re-issued exactly once in
//! [`RequestMode::Baseline`]. Models the [`CapabilityMap`] already describes
//! as lacking a requested capability go straight to baseline.
//!
//! Each mode runs through the [`RequestExecutor`], so recoverable failures are
//! absorbed by credential rotation before this layer sees them.

use std::future::Future;
use std::sync::Arc;

use domain::{
    CapabilityMap, CapabilitySet, Credential, GenerationError, GenerationOutput,
    GenerationProvider, GenerationTask, ModelId, ProviderError, RequestMode,
};
use tracing::{debug, info, warn};

use crate::RequestExecutor;

/// Which mode satisfied a logical call, together with its result.
///
/// Transient: it lives only as long as the item's attempt loop.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationOutcome<T> {
    /// Mode of the successful request.
    pub mode: RequestMode,
    /// Result of the successful request.
    pub value: T,
}

/// Wraps the executor with the two-tier capability fallback.
#[derive(Clone)]
pub struct CapabilityNegotiator {
    executor: RequestExecutor,
    provider: Arc<dyn GenerationProvider>,
    model: ModelId,
    capabilities: CapabilityMap,
}

impl CapabilityNegotiator {
    /// Creates a negotiator issuing requests for `model` through `provider`.
    pub fn new(
        executor: RequestExecutor,
        provider: Arc<dyn GenerationProvider>,
        model: ModelId,
    ) -> Self {
        Self {
            executor,
            provider,
            model,
            capabilities: CapabilityMap::new(),
        }
    }

    /// Sets the capability descriptors used to skip doomed enhanced attempts.
    pub fn with_capabilities(mut self, capabilities: CapabilityMap) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The model requests are issued for.
    pub fn model(&self) -> &ModelId {
        &self.model
    }

    /// The executor used for every mode.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Picks the first mode to try for a request asking for `requested`.
    ///
    /// Nothing requested means enhanced and baseline are the same request, so
    /// baseline is used directly.
    pub fn initial_mode(&self, requested: &CapabilitySet) -> RequestMode {
        if requested.is_empty() {
            return RequestMode::Baseline;
        }
        if self.capabilities.known_to_lack(&self.model, requested) {
            let missing = match self.capabilities.lookup(&self.model) {
                Some(available) => requested.missing_from(available),
                None => requested.clone(),
            };
            info!(
                model = %self.model,
                missing = %missing,
                "Model lacks requested capabilities, skipping enhanced request"
            );
            return RequestMode::Baseline;
        }
        RequestMode::Enhanced
    }

    /// Runs `work` with capability fallback.
    ///
    /// `work` receives the mode and credential for one provider call. At most
    /// two executor runs happen: one enhanced and at most one baseline. A
    /// capability mismatch on the baseline run is returned as-is.
    pub async fn negotiate<T, F, Fut>(
        &self,
        requested: &CapabilitySet,
        override_credential: Option<&Credential>,
        mut work: F,
    ) -> Result<NegotiationOutcome<T>, GenerationError>
    where
        F: FnMut(RequestMode, Credential) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if self.initial_mode(requested) == RequestMode::Enhanced {
            let enhanced = self
                .executor
                .run(override_credential, |cred| work(RequestMode::Enhanced, cred))
                .await;
            match enhanced {
                Ok(value) => {
                    return Ok(NegotiationOutcome {
                        mode: RequestMode::Enhanced,
                        value,
                    })
                }
                Err(GenerationError::Provider(err)) if err.is_capability_mismatch() => {
                    warn!(
                        model = %self.model,
                        error = %err,
                        "Capability not supported, retrying once in baseline mode"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let value = self
            .executor
            .run(override_credential, |cred| work(RequestMode::Baseline, cred))
            .await?;
        debug!(model = %self.model, "Baseline request succeeded");
        Ok(NegotiationOutcome {
            mode: RequestMode::Baseline,
            value,
        })
    }

    /// Generates one output for `task` through the configured provider.
    pub async fn generate(
        &self,
        task: &GenerationTask,
        override_credential: Option<&Credential>,
    ) -> Result<NegotiationOutcome<GenerationOutput>, GenerationError> {
        let provider: &dyn GenerationProvider = self.provider.as_ref();
        let enhanced = task.to_request(&self.model, RequestMode::Enhanced);
        let baseline = task.to_request(&self.model, RequestMode::Baseline);
        let (enhanced, baseline) = (&enhanced, &baseline);

        self.negotiate(&task.capabilities, override_credential, move |mode, cred| async move {
            let request = match mode {
                RequestMode::Enhanced => enhanced,
                RequestMode::Baseline => baseline,
            };
            provider.generate(request, &cred).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use domain::{Capability, GenerationRequest, TaskPayload};

    use super::*;
    use crate::CredentialPool;

    /// Records the mode of every call and fails according to a rule.
    struct ModeProvider {
        calls: Mutex<Vec<RequestMode>>,
        enhanced: fn() -> Result<GenerationOutput, ProviderError>,
        baseline: fn() -> Result<GenerationOutput, ProviderError>,
    }

    #[async_trait]
    impl GenerationProvider for ModeProvider {
        async fn generate(
            &self,
            request: &GenerationRequest,
            _credential: &Credential,
        ) -> Result<GenerationOutput, ProviderError> {
            self.calls.lock().unwrap().push(request.mode);
            match request.mode {
                RequestMode::Enhanced => (self.enhanced)(),
                RequestMode::Baseline => (self.baseline)(),
            }
        }
    }

    fn ok() -> Result<GenerationOutput, ProviderError> {
        Ok(GenerationOutput::Text("ok".into()))
    }

    fn mismatch() -> Result<GenerationOutput, ProviderError> {
        Err(ProviderError::CapabilityMismatch {
            message: "search tool is not supported".into(),
        })
    }

    fn invalid() -> Result<GenerationOutput, ProviderError> {
        Err(ProviderError::Validation {
            message: "bad schema".into(),
        })
    }

    fn negotiator(provider: Arc<ModeProvider>, model: &str) -> CapabilityNegotiator {
        let pool = Arc::new(CredentialPool::from_joined("k1,k2").unwrap());
        CapabilityNegotiator::new(
            RequestExecutor::new(pool),
            provider,
            ModelId::new(model).unwrap(),
        )
    }

    fn provider(
        enhanced: fn() -> Result<GenerationOutput, ProviderError>,
        baseline: fn() -> Result<GenerationOutput, ProviderError>,
    ) -> Arc<ModeProvider> {
        Arc::new(ModeProvider {
            calls: Mutex::new(Vec::new()),
            enhanced,
            baseline,
        })
    }

    fn grounded_task() -> GenerationTask {
        GenerationTask::new(TaskPayload::Text {
            prompt: "what is trending today".into(),
        })
        .unwrap()
        .with_capability(Capability::SearchGrounding)
    }

    #[tokio::test]
    async fn test_enhanced_success_uses_one_call() {
        let p = provider(ok, ok);
        let neg = negotiator(p.clone(), "gemini-2.0-flash");

        let outcome = neg.generate(&grounded_task(), None).await.unwrap();

        assert_eq!(outcome.mode, RequestMode::Enhanced);
        assert_eq!(*p.calls.lock().unwrap(), vec![RequestMode::Enhanced]);
    }

    #[tokio::test]
    async fn test_mismatch_falls_back_to_baseline_once() {
        let p = provider(mismatch, ok);
        let neg = negotiator(p.clone(), "gemini-2.0-flash");

        let outcome = neg.generate(&grounded_task(), None).await.unwrap();

        assert_eq!(outcome.mode, RequestMode::Baseline);
        assert_eq!(
            *p.calls.lock().unwrap(),
            vec![RequestMode::Enhanced, RequestMode::Baseline]
        );
    }

    #[tokio::test]
    async fn test_second_mismatch_is_a_hard_failure() {
        let p = provider(mismatch, mismatch);
        let neg = negotiator(p.clone(), "gemini-2.0-flash");

        let err = neg.generate(&grounded_task(), None).await.unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Provider(ProviderError::CapabilityMismatch { .. })
        ));
        assert_eq!(p.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_other_fatal_error_does_not_trigger_baseline() {
        let p = provider(invalid, ok);
        let neg = negotiator(p.clone(), "gemini-2.0-flash");

        let err = neg.generate(&grounded_task(), None).await.unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Provider(ProviderError::Validation { .. })
        ));
        assert_eq!(*p.calls.lock().unwrap(), vec![RequestMode::Enhanced]);
    }

    #[tokio::test]
    async fn test_known_lacking_model_goes_straight_to_baseline() {
        let p = provider(ok, ok);
        let model = ModelId::new("gemma-3-27b-it").unwrap();
        let neg = negotiator(p.clone(), "gemma-3-27b-it")
            .with_capabilities(CapabilityMap::new().with(model, CapabilitySet::empty()));

        let outcome = neg.generate(&grounded_task(), None).await.unwrap();

        assert_eq!(outcome.mode, RequestMode::Baseline);
        assert_eq!(*p.calls.lock().unwrap(), vec![RequestMode::Baseline]);
    }

    #[tokio::test]
    async fn test_task_without_capabilities_issues_single_baseline_call() {
        let p = provider(ok, ok);
        let neg = negotiator(p.clone(), "gemini-2.0-flash");
        let task = GenerationTask::new(TaskPayload::Text {
            prompt: "a title".into(),
        })
        .unwrap();

        neg.generate(&task, None).await.unwrap();

        assert_eq!(*p.calls.lock().unwrap(), vec![RequestMode::Baseline]);
    }

    #[tokio::test]
    async fn test_negotiate_with_custom_work() {
        let p = provider(ok, ok);
        let neg = negotiator(p, "gemini-2.0-flash");
        let requested: CapabilitySet = [Capability::StructuredOutput].into_iter().collect();

        let outcome = neg
            .negotiate(&requested, None, |mode, cred| async move {
                Ok::<_, ProviderError>(format!("{mode}:{}", cred.expose_secret()))
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, "enhanced:k1");
    }
}

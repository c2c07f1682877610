//! Scripted providers and relays for batch pipeline tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use domain::{
    AssetReference, AssetRelay, Credential, GenerationOutput, GenerationProvider,
    GenerationRequest, GenerationTask, ModelId, ProviderError, RelayError, TaskPayload,
};
use orchestrator::{
    BatchJobPipeline, BatchSettings, CapabilityNegotiator, CredentialPool, RequestExecutor,
};

type Responder =
    dyn Fn(&GenerationRequest, &Credential, usize) -> Result<GenerationOutput, ProviderError>
        + Send
        + Sync;

/// Provider whose answer is computed from the request, the credential, and
/// the zero-based global call number.
pub struct ScriptedProvider {
    responder: Box<Responder>,
    latency: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&GenerationRequest, &Credential, usize) -> Result<GenerationOutput, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        Self::with_latency(Duration::ZERO, responder)
    }

    /// Like [`ScriptedProvider::new`], but every call takes `latency` to answer.
    pub fn with_latency<F>(latency: Duration, responder: F) -> Arc<Self>
    where
        F: Fn(&GenerationRequest, &Credential, usize) -> Result<GenerationOutput, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            latency,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Echoes the prompt back as text.
    pub fn echo() -> Arc<Self> {
        Self::new(|req, _, _| Ok(GenerationOutput::Text(req.payload.prompt().to_string())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts in the order they reached the provider.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<GenerationOutput, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push(request.payload.prompt().to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.responder)(request, credential, n)
    }
}

/// Relay that either embeds the URL or fails with a transport error.
pub struct FakeRelay {
    pub reachable: bool,
    pub latency: Duration,
    pub calls: AtomicUsize,
}

impl FakeRelay {
    pub fn reachable() -> Arc<Self> {
        Self::slow(Duration::ZERO)
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            reachable: false,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    /// Reachable, but takes `latency` to answer.
    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            reachable: true,
            latency,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetRelay for FakeRelay {
    async fn relay(&self, original: &AssetReference) -> Result<AssetReference, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.reachable {
            Ok(AssetReference::embedded("image/png", "cmVsYXllZA=="))
        } else {
            Err(RelayError::Transport(format!(
                "connection refused while relaying {}",
                original.as_str()
            )))
        }
    }
}

pub fn rate_limited() -> ProviderError {
    ProviderError::RateLimit {
        message: "Resource has been exhausted".into(),
        retry_after: None,
    }
}

pub fn text_task(prompt: &str) -> GenerationTask {
    GenerationTask::new(TaskPayload::Text {
        prompt: prompt.to_string(),
    })
    .unwrap()
}

pub fn image_task(prompt: &str) -> GenerationTask {
    GenerationTask::new(TaskPayload::Image {
        prompt: prompt.to_string(),
        dimensions: None,
        style: None,
    })
    .unwrap()
}

pub fn pipeline(
    provider: Arc<ScriptedProvider>,
    credentials: &str,
    settings: BatchSettings,
) -> (BatchJobPipeline, Arc<CredentialPool>) {
    let pool = Arc::new(CredentialPool::from_joined(credentials).unwrap());
    let negotiator = CapabilityNegotiator::new(
        RequestExecutor::new(Arc::clone(&pool)),
        provider,
        ModelId::new("gemini-2.0-flash").unwrap(),
    );
    (BatchJobPipeline::new(negotiator, settings), pool)
}

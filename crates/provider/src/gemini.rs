//! `GenerationProvider` over the Gemini `generateContent` endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use domain::{Credential, GenerationOutput, GenerationProvider, GenerationRequest, ModelId, ProviderError};
use tracing::{debug, instrument};

use crate::client::{build_http_client, normalize_base_url, ClientError};
use crate::status::{map_error_response, map_transport_error, retry_after};
use crate::wire::{build_request, extract_output, GenerateContentResponse};

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings for [`GeminiProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    /// Scheme and host, e.g. `https://generativelanguage.googleapis.com`.
    pub base_url: String,
    /// Whole-request timeout for one call.
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Public Gemini API host.
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    /// Default per-call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// HTTP adapter for Gemini-style models.
///
/// Each [`GenerationProvider::generate`] call issues exactly one HTTP request
/// authenticated with the supplied credential.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiProvider {
    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the base URL is malformed or the HTTP client
    /// cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http_client(config.timeout)?,
            base_url: normalize_base_url(&config.base_url)?,
        })
    }

    fn endpoint(&self, model: &ModelId) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    #[instrument(
        skip_all,
        fields(model = %request.model, mode = %request.mode, credential = %credential.fingerprint())
    )]
    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<GenerationOutput, ProviderError> {
        let body = build_request(request);
        let started = Instant::now();

        let response = self
            .http
            .post(self.endpoint(&request.model))
            .header(API_KEY_HEADER, credential.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        let hint = retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| map_transport_error(&e))?;

        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generateContent responded"
        );

        if !status.is_success() {
            return Err(map_error_response(status.as_u16(), hint, &text));
        }

        let decoded: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Server {
                status: status.as_u16(),
                message: format!("malformed response body: {e}"),
            })?;
        extract_output(&request.payload, decoded)
    }
}

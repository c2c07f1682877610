//! Port traits implemented by infrastructure crates.
//!
//! The orchestrator depends only on these traits. The `provider` crate
//! supplies HTTP implementations; tests supply scripted fakes.

use async_trait::async_trait;

use crate::{AssetReference, Credential, GenerationOutput, GenerationRequest, ProviderError, RelayError};

/// Performs a single generation call against an external provider.
///
/// Implementations make exactly one attempt per call. Rotation, retry and
/// capability fallback are the orchestrator's job; an implementation only has
/// to map its failures onto the [`ProviderError`] taxonomy faithfully.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Issues `request` authenticated with `credential`.
    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<GenerationOutput, ProviderError>;
}

/// Re-hosts a remote asset as an embedded reference.
///
/// Implementations make one attempt and never retry internally.
#[async_trait]
pub trait AssetRelay: Send + Sync {
    /// Fetches `original` through the relay and returns the embedded result.
    async fn relay(&self, original: &AssetReference) -> Result<AssetReference, RelayError>;
}

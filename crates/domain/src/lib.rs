//! Generation domain for Genflow.
//!
//! This crate holds every domain concept used by the generation orchestration
//! layer: newtype identifiers, credentials, tasks and the requests derived from
//! them, job items and their state machine, the error taxonomy, and the port
//! traits infrastructure crates implement.
//!
//! ## Architectural Layer
//!
//! **Business types + port definitions.** This crate has no I/O dependencies.
//! It defines *what* a provider or relay must do; the `provider` crate defines
//! *how* over HTTP, and the `orchestrator` crate drives the calls.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`BatchId`, `JobItemId`, `ModelId`) |
//! | [`credentials`] | `Credential` with log-safe fingerprint |
//! | [`capabilities`] | Capability flags, per-model descriptors, request modes |
//! | [`task`] | `GenerationTask`, typed payloads, `GenerationRequest` |
//! | [`output`] | `GenerationOutput` and `AssetReference` |
//! | [`job`] | `JobItem` and its status state machine |
//! | [`errors`] | Provider error taxonomy, `ErrorClass`, `ErrorClassifier` |
//! | [`ports`] | `GenerationProvider` and `AssetRelay` traits |
//! | [`types`] | `Timestamp`, `BatchProgress` |

pub mod capabilities;
pub mod credentials;
pub mod errors;
pub mod identifiers;
pub mod job;
pub mod output;
pub mod ports;
pub mod task;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use capabilities::{Capability, CapabilityMap, CapabilitySet, RequestMode};
pub use credentials::Credential;
pub use errors::{
    ErrorClass, ErrorClassifier, GenerationError, ProviderError, RelayError, StandardClassifier,
};
pub use identifiers::{BatchId, JobItemId, ModelId};
pub use job::{JobItem, JobStatus, TransitionError};
pub use output::{AssetReference, GenerationOutput};
pub use ports::{AssetRelay, GenerationProvider};
pub use task::{Dimensions, GenerationRequest, GenerationTask, TaskError, TaskPayload};
pub use types::{BatchProgress, Timestamp};

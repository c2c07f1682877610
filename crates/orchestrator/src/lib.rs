//! Genflow generation orchestration.
//!
//! This crate turns a batch of generation tasks into reliable outcomes over an
//! unreliable, rate-limited, multi-credential provider:
//!
//! ```text
//! BatchJobPipeline::submit(tasks)
//!   └─ per item: CapabilityNegotiator::generate
//!        └─ per mode: RequestExecutor::run
//!             └─ per attempt: CredentialPool::next → GenerationProvider::generate
//!   └─ on success: AssetRelay::relay (optional, failure only warns)
//! ```
//!
//! ## Architectural Layer
//!
//! **Orchestration.** Components sequence calls between the [`domain`] types
//! and the port traits it defines. They contain no HTTP or wire-format code.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`pool`] | `CredentialPool`: ordered credentials + atomic rotation cursor |
//! | [`executor`] | `RequestExecutor`: bounded rotation loop with error classification |
//! | [`negotiator`] | `CapabilityNegotiator`: enhanced → baseline fallback |
//! | [`settings`] | `BatchSettings`: delays, retry ceilings, back-off |
//! | [`batch`] | `BatchJobPipeline`, `BatchHandle`, `BatchReport` |

pub mod batch;
pub mod executor;
pub mod negotiator;
pub mod pool;
pub mod settings;

pub use batch::{
    BatchError, BatchEvent, BatchHandle, BatchJobPipeline, BatchReport, SubmitError, SubmitOptions,
};
pub use executor::RequestExecutor;
pub use negotiator::{CapabilityNegotiator, NegotiationOutcome};
pub use pool::{CredentialPool, PoolError};
pub use settings::BatchSettings;

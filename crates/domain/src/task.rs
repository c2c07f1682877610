//! Generation tasks and the provider request derived from them.
//!
//! A [`GenerationTask`] is what a caller submits. The orchestrator turns each
//! replica of a task into a [`GenerationRequest`], which is what a
//! [`crate::GenerationProvider`] receives together with a credential.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{Capability, CapabilitySet, ModelId, RequestMode};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Output width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Returns the reduced aspect ratio, e.g. `"16:9"` for 1920×1080.
    pub fn aspect_ratio(self) -> String {
        fn gcd(a: u32, b: u32) -> u32 {
            if b == 0 {
                a
            } else {
                gcd(b, a % b)
            }
        }
        let d = gcd(self.width, self.height).max(1);
        format!("{}:{}", self.width / d, self.height / d)
    }
}

/// What kind of content a task asks for, with the fields that kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Free-form text (titles, descriptions, scripts).
    Text {
        /// The prompt sent to the provider.
        prompt: String,
    },
    /// A JSON document, optionally constrained by a JSON schema.
    Structured {
        /// The prompt sent to the provider.
        prompt: String,
        /// Optional JSON schema the response must follow.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<Value>,
    },
    /// An image asset (thumbnails, artwork).
    Image {
        /// The prompt sent to the provider.
        prompt: String,
        /// Requested output size.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimensions: Option<Dimensions>,
        /// Free-form style hint (e.g. `"flat illustration"`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<String>,
    },
}

impl TaskPayload {
    /// Returns the prompt, whatever the payload kind.
    pub fn prompt(&self) -> &str {
        match self {
            TaskPayload::Text { prompt }
            | TaskPayload::Structured { prompt, .. }
            | TaskPayload::Image { prompt, .. } => prompt,
        }
    }

    /// Returns the lowercase kind tag (`"text"`, `"structured"`, `"image"`).
    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::Text { .. } => "text",
            TaskPayload::Structured { .. } => "structured",
            TaskPayload::Image { .. } => "image",
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Why a task could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The prompt was empty or only whitespace.
    #[error("Task prompt must not be empty")]
    EmptyPrompt,

    /// The replication count was zero.
    #[error("Replication count must be at least 1")]
    ZeroReplication,

    /// A dimension was zero.
    #[error("Image dimensions must be non-zero, got {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// One caller-requested unit of generation, replicated `replication_count` times.
///
/// Immutable once submitted. Construct with [`GenerationTask::new`] (or
/// deserialise and call [`GenerationTask::validate`]) so the invariants hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    /// What to generate.
    pub payload: TaskPayload,

    /// Content the output must avoid (negative prompt).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_constraint: Option<String>,

    /// Extended capabilities to request in enhanced mode.
    #[serde(default, skip_serializing_if = "CapabilitySet::is_empty")]
    pub capabilities: CapabilitySet,

    /// How many independent outputs to produce. Always ≥ 1.
    #[serde(default = "default_replication")]
    pub replication_count: u32,
}

fn default_replication() -> u32 {
    1
}

impl GenerationTask {
    /// Creates a single-replica task.
    pub fn new(payload: TaskPayload) -> Result<Self, TaskError> {
        let task = Self {
            payload,
            negative_constraint: None,
            capabilities: CapabilitySet::empty(),
            replication_count: 1,
        };
        task.validate()?;
        Ok(task)
    }

    /// Sets the negative constraint. Blank values clear it.
    pub fn with_negative_constraint(mut self, negative: impl Into<String>) -> Self {
        let negative = negative.into();
        self.negative_constraint = if negative.trim().is_empty() {
            None
        } else {
            Some(negative)
        };
        self
    }

    /// Adds a capability to request in enhanced mode.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Sets the replication count.
    pub fn with_replication(mut self, count: u32) -> Result<Self, TaskError> {
        if count == 0 {
            return Err(TaskError::ZeroReplication);
        }
        self.replication_count = count;
        Ok(self)
    }

    /// Checks the task invariants. Deserialised tasks must pass through this
    /// before submission.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.payload.prompt().trim().is_empty() {
            return Err(TaskError::EmptyPrompt);
        }
        if self.replication_count == 0 {
            return Err(TaskError::ZeroReplication);
        }
        if let TaskPayload::Image {
            dimensions: Some(d),
            ..
        } = &self.payload
        {
            if d.width == 0 || d.height == 0 {
                return Err(TaskError::InvalidDimensions {
                    width: d.width,
                    height: d.height,
                });
            }
        }
        Ok(())
    }

    /// Builds the provider request for this task in the given mode.
    ///
    /// Baseline mode strips every requested extended capability. Image output
    /// is intrinsic to image payloads and therefore survives in both modes.
    pub fn to_request(&self, model: &ModelId, mode: RequestMode) -> GenerationRequest {
        let mut capabilities = match mode {
            RequestMode::Enhanced => self.capabilities.clone(),
            RequestMode::Baseline => CapabilitySet::empty(),
        };
        if matches!(self.payload, TaskPayload::Image { .. }) {
            capabilities.insert(Capability::ImageOutput);
        }
        GenerationRequest {
            model: model.clone(),
            payload: self.payload.clone(),
            negative_constraint: self.negative_constraint.clone(),
            capabilities,
            mode,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider request
// ---------------------------------------------------------------------------

/// A single provider call, minus the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model the request targets.
    pub model: ModelId,
    /// What to generate.
    pub payload: TaskPayload,
    /// Content the output must avoid.
    pub negative_constraint: Option<String>,
    /// Capabilities included in this request.
    pub capabilities: CapabilitySet,
    /// Mode this request was built for.
    pub mode: RequestMode,
}

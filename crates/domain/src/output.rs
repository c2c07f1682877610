//! Generation outputs returned by providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to a generated asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetReference {
    /// A remotely hosted asset; direct access may be blocked for the caller.
    Url {
        /// Absolute URL of the asset.
        url: String,
    },
    /// An asset embedded as a `data:` URI.
    Embedded {
        /// The full `data:<mime>;base64,<payload>` URI.
        data_uri: String,
    },
}

impl AssetReference {
    /// Builds an embedded reference from a MIME type and base64 payload.
    pub fn embedded(mime_type: &str, base64_data: &str) -> Self {
        AssetReference::Embedded {
            data_uri: format!("data:{mime_type};base64,{base64_data}"),
        }
    }

    /// Returns `true` for remotely hosted assets (the only kind worth relaying).
    pub fn is_remote(&self) -> bool {
        matches!(self, AssetReference::Url { .. })
    }

    /// Returns the URL or data URI as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            AssetReference::Url { url } => url,
            AssetReference::Embedded { data_uri } => data_uri,
        }
    }
}

/// What a successful provider call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum GenerationOutput {
    /// Plain text.
    Text(String),
    /// A parsed JSON document.
    Json(Value),
    /// A generated asset.
    Asset(AssetReference),
}

impl GenerationOutput {
    /// Returns the asset reference if this output is an asset.
    pub fn as_asset(&self) -> Option<&AssetReference> {
        match self {
            GenerationOutput::Asset(asset) => Some(asset),
            _ => None,
        }
    }
}

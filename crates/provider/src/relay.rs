//! `AssetRelay` over an HTTP relay endpoint.
//!
//! Protocol: `GET {base}/relay?url=<original>` answers
//! `{ "success": true, "asset": "data:..." }` or
//! `{ "success": false, "error": "..." }`; any non-2xx status is a failure.
//! One attempt per call, no authentication.

use std::time::Duration;

use async_trait::async_trait;
use domain::{AssetReference, AssetRelay, RelayError};
use serde::Deserialize;
use tracing::debug;

use crate::client::{build_http_client, normalize_base_url, ClientError};

#[derive(Debug, Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    asset: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the relay endpoint.
#[derive(Debug, Clone)]
pub struct HttpAssetRelay {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpAssetRelay {
    /// Default per-call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a relay client for `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http_client(timeout)?,
            endpoint: format!("{}/relay", normalize_base_url(base_url)?),
        })
    }
}

#[async_trait]
impl AssetRelay for HttpAssetRelay {
    async fn relay(&self, original: &AssetReference) -> Result<AssetReference, RelayError> {
        let AssetReference::Url { url } = original else {
            return Err(RelayError::NotRelayable);
        };

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("url", url.as_str())])
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        let body: RelayResponse =
            serde_json::from_str(&text).map_err(|e| RelayError::Malformed(e.to_string()))?;

        if !body.success {
            return Err(RelayError::Rejected(
                body.error.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        match body.asset {
            Some(data_uri) if data_uri.starts_with("data:") => {
                debug!(bytes = data_uri.len(), "Relay returned embedded asset");
                Ok(AssetReference::Embedded { data_uri })
            }
            Some(_) => Err(RelayError::Malformed(
                "asset is not a data: URI".to_string(),
            )),
            None => Err(RelayError::Malformed(
                "success response without asset".to_string(),
            )),
        }
    }
}

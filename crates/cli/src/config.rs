//! Configuration file loading and validation.
//!
//! The file is TOML (default `.genflow/config.toml`). Every section is
//! optional except that at least one credential must resolve, either from
//! `credentials.keys` or from the environment variable named by
//! `credentials.env` (which takes precedence when set and non-blank).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use domain::{Capability, CapabilityMap, CapabilitySet, Credential, ModelId};
use orchestrator::BatchSettings;
use provider::client::normalize_base_url;
use provider::GeminiConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = ".genflow/config.toml";

/// Default environment variable holding comma-joined credentials.
pub const DEFAULT_CREDENTIALS_ENV: &str = "GENFLOW_API_KEYS";

const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// The configuration could not be loaded or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// The file that was requested.
        path: PathBuf,
        /// The I/O failure.
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the expected shape.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// The file that was read.
        path: PathBuf,
        /// The deserialisation failure, including the offending key.
        source: toml::de::Error,
    },

    /// `provider.model` is blank.
    #[error("provider.model must not be empty")]
    EmptyModel,

    /// `batch.item_max_attempts` is zero.
    #[error("batch.item_max_attempts must be at least 1")]
    ZeroAttempts,

    /// Neither the environment nor `credentials.keys` yields a credential.
    #[error("No credentials configured: set credentials.keys or the {env} environment variable")]
    NoCredentials {
        /// The environment variable that was consulted.
        env: String,
    },

    /// A base URL is not an absolute http(s) URL with a host.
    #[error("{field} is not a valid http(s) URL: '{url}'")]
    InvalidUrl {
        /// Dotted path of the setting, e.g. `relay.base_url`.
        field: &'static str,
        /// The rejected value.
        url: String,
    },

    /// A key of the `capabilities` table is blank.
    #[error("capabilities has an empty model identifier")]
    EmptyCapabilityModel,
}

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenflowConfig {
    /// Generation endpoint and model.
    #[serde(default)]
    pub provider: ProviderSection,
    /// Where credentials come from.
    #[serde(default)]
    pub credentials: CredentialsSection,
    /// Optional asset relay.
    #[serde(default)]
    pub relay: RelaySection,
    /// Pacing, retries and the batch deadline.
    #[serde(default)]
    pub batch: BatchSection,
    /// Model identifier → capabilities it supports.
    #[serde(default)]
    pub capabilities: BTreeMap<String, Vec<Capability>>,
    /// Log format and trace export.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// `[provider]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    /// API root, without the `/models/...` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used for every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    GeminiConfig::DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    GeminiConfig::DEFAULT_TIMEOUT.as_secs()
}

/// `[credentials]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsSection {
    /// Comma-joined credentials.
    #[serde(default)]
    pub keys: Option<String>,
    /// Environment variable consulted before `keys`.
    #[serde(default = "default_credentials_env")]
    pub env: String,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            keys: None,
            env: default_credentials_env(),
        }
    }
}

fn default_credentials_env() -> String {
    DEFAULT_CREDENTIALS_ENV.to_string()
}

/// `[relay]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    /// Relay endpoint. Absent disables relaying.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds. Defaults to 30.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// `[batch]`. Missing keys take the [`BatchSettings`] defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSection {
    /// Courtesy pause between consecutive tasks, in milliseconds.
    pub inter_task_delay_ms: u64,
    /// Attempts per item, including the first. Must be at least 1.
    pub item_max_attempts: u32,
    /// Back-off after the first failed attempt, in milliseconds. Doubles
    /// after each further failure.
    pub retry_backoff_ms: u64,
    /// Upper bound on any single back-off, in milliseconds.
    pub max_backoff_ms: u64,
    /// Whether an exhausted credential pool is retried at item level.
    pub retry_pool_exhaustion: bool,
    /// Batch-wide deadline in seconds. Absent means no deadline.
    pub batch_timeout_secs: Option<u64>,
}

impl Default for BatchSection {
    fn default() -> Self {
        let defaults = BatchSettings::default();
        Self {
            inter_task_delay_ms: defaults.inter_task_delay.as_millis() as u64,
            item_max_attempts: defaults.item_max_attempts,
            retry_backoff_ms: defaults.retry_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
            retry_pool_exhaustion: defaults.retry_pool_exhaustion,
            batch_timeout_secs: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// `[telemetry]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Format of the stderr log stream.
    #[serde(default)]
    pub log_format: LogFormat,
    /// OTLP gRPC endpoint. Absent disables trace export.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl GenflowConfig {
    /// Reads and validates `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without the environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if self.batch.item_max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        check_url("provider.base_url", &self.provider.base_url)?;
        if let Some(url) = &self.relay.base_url {
            check_url("relay.base_url", url)?;
        }
        if let Some(url) = &self.telemetry.otlp_endpoint {
            check_url("telemetry.otlp_endpoint", url)?;
        }
        if self.capabilities.keys().any(|model| model.trim().is_empty()) {
            return Err(ConfigError::EmptyCapabilityModel);
        }
        Ok(())
    }

    /// Resolves the credential list. `lookup` reads an environment variable.
    pub fn credentials<F>(&self, lookup: F) -> Result<Vec<Credential>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = lookup(&self.credentials.env).filter(|v| !v.trim().is_empty());
        let joined = from_env.or_else(|| self.credentials.keys.clone()).unwrap_or_default();
        let credentials = Credential::parse_joined(&joined);
        if credentials.is_empty() {
            return Err(ConfigError::NoCredentials {
                env: self.credentials.env.clone(),
            });
        }
        Ok(credentials)
    }

    /// The configured model.
    pub fn model(&self) -> Result<ModelId, ConfigError> {
        ModelId::new(self.provider.model.as_str()).ok_or(ConfigError::EmptyModel)
    }

    /// Settings for the HTTP generation adapter.
    pub fn gemini(&self) -> GeminiConfig {
        GeminiConfig {
            base_url: self.provider.base_url.clone(),
            timeout: Duration::from_secs(self.provider.timeout_secs),
        }
    }

    /// Pipeline settings built from `[batch]`.
    pub fn batch_settings(&self) -> BatchSettings {
        let b = &self.batch;
        BatchSettings {
            inter_task_delay: Duration::from_millis(b.inter_task_delay_ms),
            item_max_attempts: b.item_max_attempts,
            retry_backoff: Duration::from_millis(b.retry_backoff_ms),
            max_backoff: Duration::from_millis(b.max_backoff_ms),
            retry_pool_exhaustion: b.retry_pool_exhaustion,
            batch_timeout: b.batch_timeout_secs.map(Duration::from_secs),
        }
    }

    /// The `capabilities` table keyed by model. Blank keys are rejected by
    /// validation and skipped here.
    pub fn capability_map(&self) -> CapabilityMap {
        let mut map = CapabilityMap::new();
        for (model, capabilities) in &self.capabilities {
            if let Some(id) = ModelId::new(model.as_str()) {
                map.insert(id, capabilities.iter().copied().collect::<CapabilitySet>());
            }
        }
        map
    }
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    normalize_base_url(url)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidUrl {
            field,
            url: url.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[provider]
base_url = "https://generativelanguage.googleapis.com"
model = "gemini-2.0-flash"
timeout_secs = 45

[credentials]
keys = "k1, k2,k1,"
env = "TEST_GENFLOW_KEYS"

[relay]
base_url = "https://relay.example.com"

[batch]
inter_task_delay_ms = 500
item_max_attempts = 4
retry_backoff_ms = 1000
max_backoff_ms = 8000
retry_pool_exhaustion = false
batch_timeout_secs = 600

[capabilities]
"gemini-2.0-flash" = ["structured_output", "search_grounding"]
"gemma-3-27b-it" = []

[telemetry]
log_format = "pretty"
otlp_endpoint = "http://localhost:4317"
"#;

    fn parse(raw: &str) -> GenflowConfig {
        toml::from_str(raw).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_full_file_maps_onto_runtime_types() {
        let config = parse(FULL);
        config.validate().unwrap();

        let settings = config.batch_settings();
        assert_eq!(settings.inter_task_delay, Duration::from_millis(500));
        assert_eq!(settings.item_max_attempts, 4);
        assert!(!settings.retry_pool_exhaustion);
        assert_eq!(settings.batch_timeout, Some(Duration::from_secs(600)));

        assert_eq!(config.gemini().timeout, Duration::from_secs(45));
        assert_eq!(config.telemetry.log_format, LogFormat::Pretty);

        let map = config.capability_map();
        let gemma = ModelId::new("gemma-3-27b-it").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup(&gemma), Some(&CapabilitySet::empty()));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("");
        config.validate().unwrap();
        assert_eq!(config.provider.model, "gemini-2.0-flash");
        assert_eq!(config.credentials.env, DEFAULT_CREDENTIALS_ENV);
        assert_eq!(config.batch_settings(), BatchSettings::default());
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert!(config.relay.base_url.is_none());
    }

    #[test]
    fn test_credentials_are_split_and_deduplicated() {
        let creds = parse(FULL).credentials(no_env).unwrap();
        let secrets: Vec<_> = creds.iter().map(Credential::expose_secret).collect();
        assert_eq!(secrets, vec!["k1", "k2"]);
    }

    #[test]
    fn test_environment_credentials_take_precedence() {
        let config = parse(FULL);
        let creds = config
            .credentials(|name| (name == "TEST_GENFLOW_KEYS").then(|| "e1,e2,e3".to_string()))
            .unwrap();
        assert_eq!(creds.len(), 3);
        assert_eq!(creds[0].expose_secret(), "e1");

        // A blank variable falls back to the file.
        let creds = config.credentials(|_| Some("  ".to_string())).unwrap();
        assert_eq!(creds.len(), 2);
    }

    #[test]
    fn test_missing_credentials_is_an_error() {
        let err = parse("[credentials]\nkeys = \" , \"\n")
            .credentials(no_env)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { env } if env == DEFAULT_CREDENTIALS_ENV));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = parse("");
        config.provider.model = " ".into();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyModel)));

        let mut config = parse("");
        config.batch.item_max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroAttempts)));

        let mut config = parse("");
        config.relay.base_url = Some("relay.example.com".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { field: "relay.base_url", .. })
        ));
    }

    #[test]
    fn test_unknown_keys_and_capabilities_are_rejected() {
        assert!(toml::from_str::<GenflowConfig>("[provider]\nmodle = \"x\"\n").is_err());
        assert!(toml::from_str::<GenflowConfig>("[capabilities]\nm = [\"telepathy\"]\n").is_err());
        assert!(toml::from_str::<GenflowConfig>("[telemetry]\nlog_format = \"xml\"\n").is_err());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = GenflowConfig::load(Path::new("/nonexistent/genflow.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

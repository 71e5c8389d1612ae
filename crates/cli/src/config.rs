//! Configuration loading from switchboard.toml.

use policy::Policy;
use runtime::{EngineConfig, ProviderConfig, ProviderKind, RetryConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Prompt/tool table paths and execution settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Backoff for transient provider failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Named providers, keyed by the name used in `providerName`.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Register the native `read_file`/`write_file` tools.
    #[serde(default)]
    pub file_tools: bool,

    /// Sandbox and file tool policy (allow/deny/limits).
    #[serde(flatten)]
    pub policy: Policy,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default_config())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.policy.validate()?;
        config.ensure_default_provider();
        Ok(config)
    }

    /// Create a default configuration.
    pub fn default_config() -> Self {
        let mut config = Self {
            engine: EngineConfig::default(),
            retry: RetryConfig::default(),
            providers: BTreeMap::new(),
            file_tools: false,
            policy: Policy::restrictive(),
        };
        config.ensure_default_provider();
        config
    }

    /// With no providers configured, the default name maps to an OpenAI
    /// provider reading `OPENAI_API_KEY`.
    fn ensure_default_provider(&mut self) {
        if self.providers.is_empty() {
            self.providers.insert(
                self.engine.default_provider.clone(),
                ProviderConfig::new(ProviderKind::Openai),
            );
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error(transparent)]
    Policy(#[from] policy::Error),
}

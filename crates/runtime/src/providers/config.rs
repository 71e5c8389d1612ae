//! Declarative provider settings, as found under `[providers.<name>]`.

use super::{
    AnthropicAuth, AnthropicProvider, AzureOpenAiProvider, GoogleAuth, OpenAiProvider,
    OpenRouterProvider, Provider, Sampling, VertexAnthropicProvider, VertexGeminiProvider,
    VertexLocation, anthropic, gemini, openai, openrouter, vertex_anthropic,
};
use crate::model::ProviderError;
use serde::Deserialize;
use std::sync::Arc;

/// Backend family of a configured provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(alias = "open_ai")]
    Openai,
    #[serde(alias = "azure")]
    AzureOpenai,
    Openrouter,
    Anthropic,
    VertexGemini,
    VertexAnthropic,
}

impl ProviderKind {
    /// Environment variable consulted when no credential is configured.
    pub fn credential_env(self) -> &'static str {
        match self {
            Self::Openai => "OPENAI_API_KEY",
            Self::AzureOpenai => "AZURE_OPENAI_API_KEY",
            Self::Openrouter => "OPENROUTER_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::VertexGemini | Self::VertexAnthropic => "GOOGLE_ACCESS_TOKEN",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::AzureOpenai => "azure_openai",
            Self::Openrouter => "openrouter",
            Self::Anthropic => "anthropic",
            Self::VertexGemini => "vertex_gemini",
            Self::VertexAnthropic => "vertex_anthropic",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

/// Settings for one named provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// API key or access token; falls back to [`ProviderKind::credential_env`].
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override the backend host, e.g. for proxies or tests.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Azure resource name (`{endpoint}.openai.azure.com`).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Azure deployment name.
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,

    /// Vertex AI project.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Vertex AI region.
    #[serde(default)]
    pub region: Option<String>,

    /// OpenRouter attribution headers.
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: None,
            model: None,
            max_tokens: None,
            temperature: None,
            endpoint: None,
            deployment: None,
            api_version: None,
            project_id: None,
            region: None,
            referer: None,
            title: None,
        }
    }

    fn sampling(&self, default_model: &str) -> Sampling {
        let mut sampling = Sampling::new(self.model.as_deref().unwrap_or(default_model));
        if let Some(max_tokens) = self.max_tokens {
            sampling.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            sampling.temperature = temperature;
        }
        sampling
    }

    fn credential(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(self.kind.credential_env()).ok())
            .filter(|value| !value.trim().is_empty())
    }

    fn require_credential(&self) -> Result<String, ProviderError> {
        self.credential().ok_or_else(|| {
            ProviderError::config(
                self.kind.label(),
                format!(
                    "no credential: set api_key or {}",
                    self.kind.credential_env()
                ),
            )
        })
    }

    fn require<'a>(&self, field: &'a Option<String>, name: &str) -> Result<&'a str, ProviderError> {
        field
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ProviderError::config(self.kind.label(), format!("missing {name}")))
    }

    /// Vertex falls back to `gcloud auth print-access-token` without a token.
    fn google_auth(&self) -> GoogleAuth {
        match self.credential() {
            Some(token) => GoogleAuth::AccessToken(token),
            None => GoogleAuth::Gcloud,
        }
    }

    fn location(&self) -> Result<VertexLocation, ProviderError> {
        Ok(VertexLocation::new(
            self.require(&self.project_id, "project_id")?,
            self.require(&self.region, "region")?,
        ))
    }

    /// Construct the configured backend.
    pub fn build(&self) -> Result<Arc<dyn Provider>, ProviderError> {
        let provider: Arc<dyn Provider> = match self.kind {
            ProviderKind::Openai => {
                let mut builder = OpenAiProvider::builder(self.require_credential()?)
                    .sampling(self.sampling(openai::DEFAULT_MODEL));
                if let Some(url) = &self.base_url {
                    builder = builder.base_url(url);
                }
                Arc::new(builder.build())
            }
            ProviderKind::AzureOpenai => {
                let deployment = self.require(&self.deployment, "deployment")?;
                let resource = match &self.base_url {
                    Some(_) => self.endpoint.as_deref().unwrap_or_default(),
                    None => self.require(&self.endpoint, "endpoint")?,
                };
                let mut builder =
                    AzureOpenAiProvider::builder(self.require_credential()?, resource, deployment)
                        .sampling(self.sampling(deployment));
                if let Some(url) = &self.base_url {
                    builder = builder.base_url(url);
                }
                if let Some(version) = &self.api_version {
                    builder = builder.api_version(version);
                }
                Arc::new(builder.build())
            }
            ProviderKind::Openrouter => {
                let mut builder = OpenRouterProvider::builder(self.require_credential()?)
                    .sampling(self.sampling(openrouter::DEFAULT_MODEL));
                if let Some(url) = &self.base_url {
                    builder = builder.base_url(url);
                }
                if let Some(referer) = &self.referer {
                    builder = builder.referer(referer);
                }
                if let Some(title) = &self.title {
                    builder = builder.title(title);
                }
                Arc::new(builder.build())
            }
            ProviderKind::Anthropic => {
                let auth = AnthropicAuth::ApiKey(self.require_credential()?);
                let mut builder = AnthropicProvider::builder(auth)
                    .sampling(self.sampling(anthropic::DEFAULT_MODEL));
                if let Some(url) = &self.base_url {
                    builder = builder.base_url(url);
                }
                Arc::new(builder.build())
            }
            ProviderKind::VertexGemini => {
                let mut builder = VertexGeminiProvider::builder(self.google_auth(), self.location()?)
                    .sampling(self.sampling(gemini::DEFAULT_MODEL));
                if let Some(url) = &self.base_url {
                    builder = builder.base_url(url);
                }
                Arc::new(builder.build())
            }
            ProviderKind::VertexAnthropic => {
                let mut builder =
                    VertexAnthropicProvider::builder(self.google_auth(), self.location()?)
                        .sampling(self.sampling(vertex_anthropic::DEFAULT_MODEL));
                if let Some(url) = &self.base_url {
                    builder = builder.base_url(url);
                }
                Arc::new(builder.build())
            }
        };
        Ok(provider)
    }
}

//! Azure OpenAI backend.
//!
//! Same protocol as OpenAI; the deployment in the URL selects the model and
//! the key travels in an `api-key` header.

use super::openai::{ApiMessage, ApiRequest, ApiResponse, ApiTool, response_to_reply};
use super::{Provider, Sampling, send_json};
use crate::model::{ChatOptions, Message, ProviderError, ProviderReply, Role};
use async_trait::async_trait;

const API_VERSION: &str = "2024-02-15-preview";
const NAME: &str = "azure_openai";

/// Builder for creating an Azure OpenAI backend.
#[derive(Debug, Clone)]
pub struct AzureOpenAiProviderBuilder {
    api_key: String,
    base_url: String,
    deployment: String,
    api_version: String,
    sampling: Sampling,
}

impl AzureOpenAiProviderBuilder {
    /// `resource` is the Azure resource name, as in `{resource}.openai.azure.com`.
    pub fn new(
        api_key: impl Into<String>,
        resource: impl AsRef<str>,
        deployment: impl Into<String>,
    ) -> Self {
        let deployment = deployment.into();
        Self {
            api_key: api_key.into(),
            base_url: format!("https://{}.openai.azure.com", resource.as_ref()),
            sampling: Sampling::new(deployment.clone()),
            deployment,
            api_version: API_VERSION.to_string(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn build(self) -> AzureOpenAiProvider {
        AzureOpenAiProvider {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url.trim_end_matches('/'),
                self.deployment,
                self.api_version
            ),
            sampling: self.sampling,
        }
    }
}

/// Azure OpenAI deployment backend.
pub struct AzureOpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
    sampling: Sampling,
}

impl AzureOpenAiProvider {
    pub fn builder(
        api_key: impl Into<String>,
        resource: impl AsRef<str>,
        deployment: impl Into<String>,
    ) -> AzureOpenAiProviderBuilder {
        AzureOpenAiProviderBuilder::new(api_key, resource, deployment)
    }
}

/// Azure rejects an empty leading system message.
fn wire_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
    let skip = match messages.first() {
        Some(first) if first.role == Role::System && first.content.trim().is_empty() => 1,
        _ => 0,
    };
    messages[skip..].iter().map(ApiMessage::from).collect()
}

#[async_trait]
impl Provider for AzureOpenAiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ProviderReply, ProviderError> {
        let request = ApiRequest {
            model: None,
            messages: wire_messages(messages),
            max_tokens: self.sampling.max_tokens(options),
            temperature: self.sampling.temperature(options),
            tools: options.tools.iter().map(ApiTool::from).collect(),
        };

        let req = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key);

        let response: ApiResponse = send_json(NAME, req, &request).await?;
        response_to_reply(NAME, response)
    }
}

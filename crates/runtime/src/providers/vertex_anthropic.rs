//! Claude models on Vertex AI (`rawPredict`).

use super::anthropic::{ApiRequest, ApiResponse, response_to_reply};
use super::google::{GoogleAuth, VertexLocation};
use super::{Provider, Sampling, send_json};
use crate::model::{ChatOptions, Message, ProviderError, ProviderReply};
use async_trait::async_trait;

pub(super) const DEFAULT_MODEL: &str = "claude-3-5-sonnet@20240620";
const VERTEX_ANTHROPIC_VERSION: &str = "vertex-2023-10-16";
const NAME: &str = "vertex_anthropic";

/// Builder for creating a Vertex AI Anthropic backend.
#[derive(Debug, Clone)]
pub struct VertexAnthropicProviderBuilder {
    auth: GoogleAuth,
    location: VertexLocation,
    base_url: Option<String>,
    sampling: Sampling,
}

impl VertexAnthropicProviderBuilder {
    pub fn new(auth: GoogleAuth, location: VertexLocation) -> Self {
        Self {
            auth,
            location,
            base_url: None,
            sampling: Sampling::new(DEFAULT_MODEL),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn build(self) -> VertexAnthropicProvider {
        let host = self.base_url.unwrap_or_else(|| self.location.host());
        VertexAnthropicProvider {
            client: reqwest::Client::new(),
            auth: self.auth,
            host: host.trim_end_matches('/').to_string(),
            location: self.location,
            sampling: self.sampling,
        }
    }
}

/// Anthropic models served by Vertex AI.
pub struct VertexAnthropicProvider {
    client: reqwest::Client,
    auth: GoogleAuth,
    host: String,
    location: VertexLocation,
    sampling: Sampling,
}

impl VertexAnthropicProvider {
    pub fn builder(auth: GoogleAuth, location: VertexLocation) -> VertexAnthropicProviderBuilder {
        VertexAnthropicProviderBuilder::new(auth, location)
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}{}:rawPredict",
            self.host,
            self.location.model_path("anthropic", model)
        )
    }
}

#[async_trait]
impl Provider for VertexAnthropicProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ProviderReply, ProviderError> {
        let token = self.auth.token(NAME).await?;

        // The model lives in the URL; the body carries the Vertex version tag instead.
        let mut request = ApiRequest::new(messages, options, &self.sampling);
        request.anthropic_version = Some(VERTEX_ANTHROPIC_VERSION);

        let req = self
            .client
            .post(self.url(self.sampling.model(options)))
            .bearer_auth(token);

        let response: ApiResponse = send_json(NAME, req, &request).await?;
        response_to_reply(NAME, response)
    }
}

//! OpenRouter backend.
//!
//! OpenRouter accepts the OpenAI message shape but this adapter advertises
//! tools through the legacy `functions` field and reads `function_call`.

use super::openai::ApiMessage;
use super::{Provider, Sampling, call_action, send_json};
use crate::model::{
    ChatOptions, EngineResponse, Message, ProviderError, ProviderReply, ToolSchema,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";
pub(super) const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";
const NAME: &str = "openrouter";

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    functions: Vec<ApiFunction<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolSchema> for ApiFunction<'a> {
    fn from(schema: &'a ToolSchema) -> Self {
        Self {
            name: &schema.name,
            description: &schema.description,
            parameters: &schema.parameters,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<ApiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn response_to_reply(response: ApiResponse) -> Result<ProviderReply, ProviderError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(ProviderError::decode(NAME, "response has no choices"));
    };

    let mut actions = Vec::new();
    if let Some(call) = choice.message.function_call {
        actions.push(call_action(NAME, call.name, &call.arguments));
    }

    Ok(ProviderReply::Structured(EngineResponse::new(
        choice.message.content.unwrap_or_default(),
        actions,
    )))
}

/// Builder for creating an OpenRouter backend.
#[derive(Debug, Clone)]
pub struct OpenRouterProviderBuilder {
    api_key: String,
    base_url: String,
    referer: Option<String>,
    title: Option<String>,
    sampling: Sampling,
}

impl OpenRouterProviderBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENROUTER_API_URL.to_string(),
            referer: None,
            title: None,
            sampling: Sampling::new(DEFAULT_MODEL),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sent as `HTTP-Referer` for OpenRouter app attribution.
    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Sent as `X-Title`.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn build(self) -> OpenRouterProvider {
        OpenRouterProvider {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            referer: self.referer,
            title: self.title,
            sampling: self.sampling,
        }
    }
}

/// OpenRouter backend.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    referer: Option<String>,
    title: Option<String>,
    sampling: Sampling,
}

impl OpenRouterProvider {
    pub fn builder(api_key: impl Into<String>) -> OpenRouterProviderBuilder {
        OpenRouterProviderBuilder::new(api_key)
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ProviderReply, ProviderError> {
        let request = ApiRequest {
            model: self.sampling.model(options),
            messages: messages.iter().map(ApiMessage::from).collect(),
            max_tokens: self.sampling.max_tokens(options),
            temperature: self.sampling.temperature(options),
            functions: options.tools.iter().map(ApiFunction::from).collect(),
        };

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        if let Some(referer) = &self.referer {
            req = req.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            req = req.header("X-Title", title);
        }

        let response: ApiResponse = send_json(NAME, req, &request).await?;
        response_to_reply(response)
    }
}

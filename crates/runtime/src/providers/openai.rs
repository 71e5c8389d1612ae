//! OpenAI chat completions backend.
//!
//! The wire types here are shared with the Azure OpenAI adapter, which speaks
//! the same protocol behind a different URL and auth header.

use super::{Provider, Sampling, call_action, send_json};
use crate::model::{
    ChatOptions, EngineResponse, Message, ProviderError, ProviderReply, ToolSchema,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const OPENAI_API_URL: &str = "https://api.openai.com";
pub(super) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const NAME: &str = "openai";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(super) struct ApiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: Vec<ApiMessage<'a>>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ApiTool<'a>>,
}

#[derive(Debug, Serialize)]
pub(super) struct ApiMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> From<&'a Message> for ApiMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        Self {
            role: msg.role.as_str(),
            content: &msg.content,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ApiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolSchema> for ApiTool<'a> {
    fn from(schema: &'a ToolSchema) -> Self {
        Self {
            kind: "function",
            function: ApiFunction {
                name: &schema.name,
                description: &schema.description,
                parameters: &schema.parameters,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiResponse {
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
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Map the first choice into a reply; `arguments` arrive as a JSON string.
pub(super) fn response_to_reply(
    provider: &str,
    response: ApiResponse,
) -> Result<ProviderReply, ProviderError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(ProviderError::decode(provider, "response has no choices"));
    };

    let actions = choice
        .message
        .tool_calls
        .into_iter()
        .map(|call| call_action(provider, call.function.name, &call.function.arguments))
        .collect();

    Ok(ProviderReply::Structured(EngineResponse::new(
        choice.message.content.unwrap_or_default(),
        actions,
    )))
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI backend.
#[derive(Debug, Clone)]
pub struct OpenAiProviderBuilder {
    api_key: String,
    base_url: String,
    sampling: Sampling,
}

impl OpenAiProviderBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            sampling: Sampling::new(DEFAULT_MODEL),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.sampling.model = model.into();
        self
    }

    pub fn build(self) -> OpenAiProvider {
        OpenAiProvider {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            sampling: self.sampling,
        }
    }
}

/// OpenAI chat completions backend.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    sampling: Sampling,
}

impl OpenAiProvider {
    pub fn builder(api_key: impl Into<String>) -> OpenAiProviderBuilder {
        OpenAiProviderBuilder::new(api_key)
    }
}

impl std::fmt::Display for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.sampling.model)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ProviderReply, ProviderError> {
        let request = ApiRequest {
            model: Some(self.sampling.model(options)),
            messages: messages.iter().map(ApiMessage::from).collect(),
            max_tokens: self.sampling.max_tokens(options),
            temperature: self.sampling.temperature(options),
            tools: options.tools.iter().map(ApiTool::from).collect(),
        };

        let req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);

        let response: ApiResponse = send_json(NAME, req, &request).await?;
        response_to_reply(NAME, response)
    }
}

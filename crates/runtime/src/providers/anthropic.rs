//! Anthropic Messages API backend.
//!
//! The wire types are shared with the Vertex AI Anthropic adapter.

use super::{Provider, Sampling, send_json, structured_call_action};
use crate::model::{
    ChatOptions, EngineResponse, Message, ProviderError, ProviderReply, Role, ToolSchema,
    split_system,
};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub(super) const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";
const NAME: &str = "anthropic";

/// Authentication mode for Anthropic API.
#[derive(Debug, Clone)]
pub enum AnthropicAuth {
    /// Standard API key authentication.
    ApiKey(String),
    /// Bearer token, for gateways that front the Messages API.
    Bearer(String),
}

impl std::fmt::Display for AnthropicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => write!(f, "api_key"),
            Self::Bearer(_) => write!(f, "bearer"),
        }
    }
}

impl AnthropicAuth {
    fn apply_headers(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Self::ApiKey(key) => req.header("x-api-key", key),
            Self::Bearer(token) => req.bearer_auth(token),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(super) struct ApiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<&'static str>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<&'a str>,
    pub messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ApiTool<'a>>,
}

impl<'a> ApiRequest<'a> {
    /// Split the system prompt into its own field and map the turns.
    pub fn new(messages: &'a [Message], options: &'a ChatOptions, sampling: &Sampling) -> Self {
        let (system, turns) = split_system(messages);
        Self {
            model: None,
            anthropic_version: None,
            max_tokens: sampling.max_tokens(options),
            temperature: sampling.temperature(options),
            system: system.filter(|s| !s.trim().is_empty()),
            messages: turns.into_iter().map(ApiMessage::from).collect(),
            tools: options.tools.iter().map(ApiTool::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for ApiMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        let role = match msg.role {
            Role::User | Role::System => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role,
            content: &msg.content,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

impl<'a> From<&'a ToolSchema> for ApiTool<'a> {
    fn from(schema: &'a ToolSchema) -> Self {
        Self {
            name: &schema.name,
            description: &schema.description,
            input_schema: &schema.parameters,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiResponse {
    #[serde(default)]
    content: Vec<ApiResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

/// Concatenate text blocks; every `tool_use` block becomes an action.
pub(super) fn response_to_reply(
    provider: &str,
    response: ApiResponse,
) -> Result<ProviderReply, ProviderError> {
    let mut content = String::new();
    let mut actions = Vec::new();

    for block in response.content {
        match block {
            ApiResponseBlock::Text { text } => content.push_str(&text),
            ApiResponseBlock::ToolUse { name, input } => {
                actions.push(structured_call_action(provider, name, input));
            }
            ApiResponseBlock::Unknown => {}
        }
    }

    Ok(ProviderReply::Structured(EngineResponse::new(content, actions)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicProviderBuilder {
    auth: AnthropicAuth,
    base_url: String,
    sampling: Sampling,
}

impl AnthropicProviderBuilder {
    pub fn new(auth: AnthropicAuth) -> Self {
        Self {
            auth,
            base_url: ANTHROPIC_API_URL.to_string(),
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

    pub fn build(self) -> AnthropicProvider {
        AnthropicProvider {
            client: reqwest::Client::new(),
            auth: self.auth,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            sampling: self.sampling,
        }
    }
}

/// Anthropic API backend.
pub struct AnthropicProvider {
    client: reqwest::Client,
    auth: AnthropicAuth,
    base_url: String,
    sampling: Sampling,
}

impl AnthropicProvider {
    pub fn builder(auth: AnthropicAuth) -> AnthropicProviderBuilder {
        AnthropicProviderBuilder::new(auth)
    }
}

impl std::fmt::Display for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({}, auth={})", self.sampling.model, self.auth)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ProviderReply, ProviderError> {
        let mut request = ApiRequest::new(messages, options, &self.sampling);
        request.model = Some(self.sampling.model(options));

        let req = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("anthropic-version", ANTHROPIC_VERSION);
        let req = self.auth.apply_headers(req);

        let response: ApiResponse = send_json(NAME, req, &request).await?;
        response_to_reply(NAME, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use serde_json::json;

    #[test]
    fn auth_display() {
        let api = AnthropicAuth::ApiKey("test".into());
        let bearer = AnthropicAuth::Bearer("test".into());
        assert_eq!(api.to_string(), "api_key");
        assert_eq!(bearer.to_string(), "bearer");
    }

    #[test]
    fn system_prompt_is_lifted_out_of_turns() {
        let messages = vec![
            Message::system("be terse"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let options = ChatOptions::default();
        let sampling = Sampling::new(DEFAULT_MODEL);
        let request = ApiRequest::new(&messages, &options, &sampling);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["system"], "be terse");
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
        assert_eq!(value["messages"][1]["role"], "assistant");
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn tools_use_input_schema() {
        let schema = ToolSchema::new("lookup", "find", json!({"type": "object"}));
        let value = serde_json::to_value(ApiTool::from(&schema)).unwrap();
        assert_eq!(value["input_schema"]["type"], "object");
    }

    #[test]
    fn tool_use_blocks_become_actions() {
        let response: ApiResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {"q": "x"}},
                {"type": "thinking", "thinking": "..."}
            ]
        }))
        .unwrap();
        let ProviderReply::Structured(reply) = response_to_reply(NAME, response).unwrap() else {
            panic!("expected structured reply");
        };
        assert_eq!(reply.content(), "Let me look.");
        assert_eq!(reply.actions(), &[Action::new("lookup", json!({"q": "x"}))]);
    }
}

//! LLM provider adapters.
//!
//! Each provider translates the normalized `(messages, options)` pair into its
//! backend's wire format, issues exactly one HTTP call and maps the reply
//! (including tool/function calls) back into a [`ProviderReply`]. Providers
//! never retry; the registry owns retry policy.

mod anthropic;
mod azure;
mod config;
mod gemini;
mod google;
mod openai;
mod openrouter;
mod vertex_anthropic;

pub use anthropic::{AnthropicAuth, AnthropicProvider};
pub use azure::AzureOpenAiProvider;
pub use config::{ProviderConfig, ProviderKind};
pub use gemini::VertexGeminiProvider;
pub use google::{GoogleAuth, VertexLocation};
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;
pub use vertex_anthropic::VertexAnthropicProvider;

use crate::model::{Action, ChatOptions, Message, ProviderError, ProviderReply};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Trait for chat-completion backends.
///
/// Implementations must not mutate `messages` and must surface network
/// failures and non-2xx statuses as [`ProviderError::Call`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend name used in errors and logs.
    fn name(&self) -> &str;

    /// Send one chat request.
    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ProviderReply, ProviderError>;
}

/// Model and sampling defaults applied when [`ChatOptions`] leaves them unset.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampling {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Sampling {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub(crate) fn model<'a>(&'a self, options: &'a ChatOptions) -> &'a str {
        options.model.as_deref().unwrap_or(&self.model)
    }

    pub(crate) fn max_tokens(&self, options: &ChatOptions) -> u32 {
        options.max_tokens.unwrap_or(self.max_tokens)
    }

    pub(crate) fn temperature(&self, options: &ChatOptions) -> f32 {
        options.temperature.unwrap_or(self.temperature)
    }
}

/// Send a JSON body and decode a JSON reply, mapping failures to [`ProviderError`].
pub(crate) async fn send_json<B, T>(
    provider: &str,
    req: RequestBuilder,
    body: &B,
) -> Result<T, ProviderError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = req
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::network(provider, e))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::status(provider, status, body));
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::decode(provider, e))
}

/// Action for a tool call whose arguments arrive as a JSON string.
///
/// Arguments that do not parse stay on the action, so only that action fails
/// once it is dispatched; its siblings are unaffected.
pub(crate) fn call_action(provider: &str, tool: String, raw: &str) -> Action {
    if raw.trim().is_empty() {
        return Action::new(tool, Value::Object(Default::default()));
    }
    match serde_json::from_str(raw) {
        Ok(data) => Action::new(tool, data),
        Err(e) => Action::unparsed(tool, raw, provider, e.to_string()),
    }
}

/// Like [`call_action`] for arguments that may be structured already or
/// nested as a string.
pub(crate) fn structured_call_action(provider: &str, tool: String, arguments: Value) -> Action {
    match arguments {
        Value::String(raw) => call_action(provider, tool, &raw),
        Value::Null => Action::new(tool, Value::Object(Default::default())),
        other => Action::new(tool, other),
    }
}

use super::ProviderError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Split a leading system message from the conversation turns.
///
/// Backends that model the system prompt as a dedicated field use this; the
/// remaining system messages (if any) are dropped from the turn list.
pub fn split_system(messages: &[Message]) -> (Option<&str>, Vec<&Message>) {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str());
    let turns = messages.iter().filter(|m| m.role != Role::System).collect();
    (system, turns)
}

/// A tool definition advertised to the model.
///
/// `parameters` is a JSON Schema object of the shape
/// `{"type": "object", "properties": {...}, "required": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Check the fields every backend needs.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("missing name".into());
        }
        if self.description.trim().is_empty() {
            return Err(format!("tool {} is missing a description", self.name));
        }
        if !self.parameters.is_object() {
            return Err(format!("tool {} is missing an object parameters schema", self.name));
        }
        Ok(())
    }
}

/// Per-call options, merged from template defaults and caller overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, alias = "aiProvider", skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
}

impl ChatOptions {
    /// Overlay `overrides` on top of `self`; fields set in `overrides` win.
    pub fn merged(&self, overrides: &ChatOptions) -> ChatOptions {
        ChatOptions {
            model: overrides.model.clone().or_else(|| self.model.clone()),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            temperature: overrides.temperature.or(self.temperature),
            provider_name: overrides
                .provider_name
                .clone()
                .or_else(|| self.provider_name.clone()),
            tools: if overrides.tools.is_empty() {
                self.tools.clone()
            } else {
                overrides.tools.clone()
            },
        }
    }

    pub fn with_provider(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }
}

/// A model-requested invocation of a tool or nested prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub echo: bool,
    /// Set when the backend's arguments for this call were not valid JSON;
    /// `data` then holds the raw text.
    #[serde(skip)]
    pub unparsed: Option<UnparsedArguments>,
}

/// Why a tool call's arguments could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsedArguments {
    pub provider: String,
    pub reason: String,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Action {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            echo: false,
            unparsed: None,
        }
    }

    /// An action whose raw `arguments` failed to parse.
    pub fn unparsed(
        name: impl Into<String>,
        raw: impl Into<String>,
        provider: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            unparsed: Some(UnparsedArguments {
                provider: provider.into(),
                reason: reason.into(),
            }),
            ..Self::new(name, Value::String(raw.into()))
        }
    }

    pub fn echoed(mut self) -> Self {
        self.echo = true;
        self
    }

    /// The parse failure carried by this action, if any.
    pub fn arguments_error(&self) -> Option<ProviderError> {
        self.unparsed
            .as_ref()
            .map(|unparsed| ProviderError::ToolArgumentsParse {
                provider: unparsed.provider.clone(),
                tool: self.name.clone(),
                reason: unparsed.reason.clone(),
            })
    }
}

/// The canonical response of a provider and of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ResponseWire", into = "ResponseWire")]
pub enum EngineResponse {
    TextOnly { content: String },
    WithActions { content: String, actions: Vec<Action> },
}

/// JSON form: `{"content": "...", "actions": [...]}`.
#[derive(Serialize, Deserialize)]
struct ResponseWire {
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    actions: Vec<Action>,
}

impl From<ResponseWire> for EngineResponse {
    fn from(wire: ResponseWire) -> Self {
        EngineResponse::new(wire.content, wire.actions)
    }
}

impl From<EngineResponse> for ResponseWire {
    fn from(response: EngineResponse) -> Self {
        match response {
            EngineResponse::TextOnly { content } => ResponseWire {
                content,
                actions: Vec::new(),
            },
            EngineResponse::WithActions { content, actions } => ResponseWire { content, actions },
        }
    }
}

impl EngineResponse {
    /// Build a response; an empty action list yields `TextOnly`.
    pub fn new(content: impl Into<String>, actions: Vec<Action>) -> Self {
        let content = content.into();
        if actions.is_empty() {
            EngineResponse::TextOnly { content }
        } else {
            EngineResponse::WithActions { content, actions }
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        EngineResponse::TextOnly {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            EngineResponse::TextOnly { content } | EngineResponse::WithActions { content, .. } => {
                content
            }
        }
    }

    pub fn actions(&self) -> &[Action] {
        match self {
            EngineResponse::TextOnly { .. } => &[],
            EngineResponse::WithActions { actions, .. } => actions,
        }
    }

    /// `{"content": ..., "actions": [...]}`; `actions` is omitted when empty.
    pub fn to_json(&self) -> Value {
        match self {
            EngineResponse::TextOnly { content } => json!({ "content": content }),
            EngineResponse::WithActions { content, actions } => {
                json!({ "content": content, "actions": actions })
            }
        }
    }
}

/// What a provider hands back: raw model text or an already structured response.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderReply {
    Raw(String),
    Structured(EngineResponse),
}

impl ProviderReply {
    /// A reply must be non-empty text, or carry content or actions.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ProviderReply::Raw(text) if text.is_empty() => Err("empty raw response".into()),
            ProviderReply::Raw(_) => Ok(()),
            ProviderReply::Structured(response) => {
                if response.content().is_empty() && response.actions().is_empty() {
                    Err("response carries neither content nor actions".into())
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl From<EngineResponse> for ProviderReply {
    fn from(response: EngineResponse) -> Self {
        ProviderReply::Structured(response)
    }
}

//! Prompt execution: render a template, call a provider, dispatch the actions
//! the model asks for, and loop while any of them echo a result back.

mod cache;
mod loader;
mod parse;
mod repair;
mod template;

pub use cache::ResponseCache;
pub use loader::{PromptTable, ToolEntry, load_tool_table, parse_tool_table};
pub use repair::repair_json;
pub use template::{FieldType, PlaceholderMode, PromptTemplate, render};

use crate::error::{Error, Result};
use crate::model::{Action, ChatOptions, EngineResponse, Message, ToolSchema};
use crate::registry::ProviderRegistry;
use crate::tools::ToolRegistry;
use parse::parse_reply;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

/// Provider calls allowed per top-level invocation.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

const ACTIONS_INSTRUCTION: &str = "To use a tool or a prompt, add an actions parameter to your \
response containing an array of action objects. Action objects have the format \
{ name: \"<tool or prompt name>\", data: { key: value } }. Set echo: true on an action to \
receive its result before answering.";

/// Engine settings, as found under `[engine]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prompt table file.
    pub prompts: PathBuf,
    /// Tool table file.
    pub tools: PathBuf,
    pub max_iterations: usize,
    pub placeholders: PlaceholderMode,
    /// Memoize provider responses by exact request.
    pub cache: bool,
    pub default_provider: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prompts: PathBuf::from("prompts.json"),
            tools: PathBuf::from("tools.json"),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            placeholders: PlaceholderMode::default(),
            cache: true,
            default_provider: "openai".to_string(),
        }
    }
}

/// Per-invocation inputs besides the request object.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Conversation state; wins over request fields when rendering.
    pub state: Map<String, Value>,
    /// Caller options layered over the template's.
    pub overrides: ChatOptions,
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: Map<String, Value>) -> Self {
        self.state = state;
        self
    }

    pub fn with_overrides(mut self, overrides: ChatOptions) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

// ─── Protocol Envelope ───────────────────────────────────────────────

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    options: [&'static str; 3],
}

const RESPONSE_FORMAT: ResponseFormat = ResponseFormat {
    kind: "json_object",
    options: ["JSON_OUTPUT_ONLY", "DISABLE_COMMENTARY", "DISABLE_CODEBLOCKS"],
};

#[derive(Serialize)]
struct PromptSummary<'a> {
    name: &'a str,
    #[serde(rename = "requestFormat", skip_serializing_if = "Option::is_none")]
    request_format: Option<&'a BTreeMap<String, FieldType>>,
}

#[derive(Serialize)]
struct SystemEnvelope<'a> {
    system: String,
    response_format: &'a ResponseFormat,
    tools: &'a [ToolSchema],
    prompts: Vec<PromptSummary<'a>>,
    actions: &'static str,
}

#[derive(Serialize)]
struct UserEnvelope<'a> {
    user: String,
    response_format: &'a ResponseFormat,
    state: &'a Map<String, Value>,
}

type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Executes prompt templates against a provider registry and tool registry.
///
/// The engine owns its prompt table and response cache; registries are shared
/// and may serve several engines.
#[derive(Debug)]
pub struct Engine {
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    prompts: PromptTable,
    cache: ResponseCache,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        tools: Arc<ToolRegistry>,
        prompts: PromptTable,
    ) -> Self {
        Self {
            providers,
            tools,
            prompts,
            cache: ResponseCache::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn prompts(&self) -> &PromptTable {
        &self.prompts
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Run an inline template with default options.
    pub async fn execute(&self, template: &PromptTemplate, request: Value) -> Result<EngineResponse> {
        self.execute_with("inline", template, request, RunOptions::default())
            .await
    }

    /// Run the prompt table entry `name`.
    pub async fn execute_prompt(
        &self,
        name: &str,
        request: Value,
        options: RunOptions,
    ) -> Result<EngineResponse> {
        let template = self
            .prompts
            .get(name)
            .ok_or_else(|| Error::UnknownPrompt(name.to_string()))?;
        self.execute_with(name, template, request, options).await
    }

    /// Run `template` under the label `name`.
    ///
    /// Every provider call made on behalf of this invocation, including calls
    /// for nested prompt actions, counts against `max_iterations`.
    pub async fn execute_with(
        &self,
        name: &str,
        template: &PromptTemplate,
        request: Value,
        options: RunOptions,
    ) -> Result<EngineResponse> {
        let span = info_span!("prompt", id = %Uuid::new_v4(), prompt = name);
        let mut steps = 0;
        self.invoke(name, template, request, &options, &mut steps)
            .instrument(span)
            .await
    }

    /// One provider round trip through the response cache.
    pub async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<EngineResponse> {
        let key = self
            .config
            .cache
            .then(|| ResponseCache::key(messages, options));
        if let Some(hit) = key.as_deref().and_then(|key| self.cache.get(key)) {
            debug!("response cache hit");
            return Ok(hit);
        }

        let reply = self.providers.chat(messages, options).await?;
        let response = parse_reply(reply);
        if let Some(key) = key {
            self.cache.insert(key, response.clone());
        }
        Ok(response)
    }

    async fn invoke(
        &self,
        name: &str,
        template: &PromptTemplate,
        request: Value,
        run: &RunOptions,
        steps: &mut usize,
    ) -> Result<EngineResponse> {
        let request = request_object(name, request)?;
        template.check_request(name, &request)?;

        let mut messages = self.build_messages(name, template, request, &run.state)?;
        let options = template
            .merged_options(&run.overrides)
            .with_tools(self.tools.describe());

        loop {
            if *steps >= self.config.max_iterations {
                return Err(Error::LoopLimitExceeded {
                    prompt: name.to_string(),
                    limit: self.config.max_iterations,
                });
            }
            *steps += 1;

            let response = tokio::select! {
                biased;
                _ = run.cancel.cancelled() => {
                    return Err(Error::Cancelled { prompt: name.to_string() });
                }
                response = self.chat(&messages, &options) => response?,
            };
            messages.push(Message::assistant(response.to_json().to_string()));

            let mut echoed = false;
            for action in response.actions() {
                if let Some(source) = action.arguments_error() {
                    return Err(Error::ActionArguments {
                        prompt: name.to_string(),
                        action: action.name.clone(),
                        source,
                    });
                }
                let result = self.dispatch(name, action, run, steps).await?;
                if action.echo {
                    messages.push(Message::user(result.to_string()));
                    echoed = true;
                }
            }
            if !echoed {
                debug!(steps = *steps, "prompt finished");
                return Ok(response);
            }
        }
    }

    /// Resolve an action against tools first, then prompts.
    fn dispatch<'a>(
        &'a self,
        prompt: &'a str,
        action: &'a Action,
        run: &'a RunOptions,
        steps: &'a mut usize,
    ) -> ActionFuture<'a> {
        Box::pin(async move {
            if self.tools.contains(&action.name) {
                return self
                    .tools
                    .execute(&action.name, action.data.clone(), &run.cancel)
                    .await
                    .map_err(|source| Error::Tool {
                        prompt: prompt.to_string(),
                        action: action.name.clone(),
                        data: action.data.clone(),
                        source,
                    });
            }

            if let Some(template) = self.prompts.get(&action.name) {
                debug!(parent = prompt, nested = %action.name, "nested prompt");
                let response = self
                    .invoke(&action.name, template, action.data.clone(), run, steps)
                    .await?;
                return Ok(response.to_json());
            }

            Err(Error::UnknownAction {
                prompt: prompt.to_string(),
                action: action.name.clone(),
                data: action.data.clone(),
            })
        })
    }

    fn build_messages(
        &self,
        name: &str,
        template: &PromptTemplate,
        request: Map<String, Value>,
        state: &Map<String, Value>,
    ) -> Result<Vec<Message>> {
        let mut values = request;
        values.extend(state.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mode = self.config.placeholders;
        let system = render(&template.system, &values, mode, name)?;
        let user = render(&template.user, &values, mode, name)?;

        let tools = self.tools.describe();
        let prompts = self
            .prompts
            .iter()
            .map(|(name, template)| PromptSummary {
                name,
                request_format: template.request_format.as_ref(),
            })
            .collect();

        let system = serde_json::to_string(&SystemEnvelope {
            system,
            response_format: &RESPONSE_FORMAT,
            tools: &tools,
            prompts,
            actions: ACTIONS_INSTRUCTION,
        })?;
        let user = serde_json::to_string(&UserEnvelope {
            user,
            response_format: &RESPONSE_FORMAT,
            state,
        })?;
        Ok(vec![Message::system(system), Message::user(user)])
    }
}

/// The request must be a JSON object; `null` stands for an empty one.
fn request_object(prompt: &str, request: Value) -> Result<Map<String, Value>> {
    match request {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::RequestFormat {
            prompt: prompt.to_string(),
            field: String::new(),
            expected: "object".to_string(),
            actual: crate::tools::json_type(&other).to_string(),
        }),
    }
}

//! Switchboard runtime: provider-neutral prompt execution.
//!
//! This crate drives prompt templates against interchangeable chat backends,
//! letting the model call registered tools and nested prompts until it
//! produces a final answer.
//!
//! # Overview
//!
//! - **Provider**: one chat backend (OpenAI, Azure OpenAI, OpenRouter,
//!   Anthropic, Vertex Gemini, Vertex Anthropic) translated to a single
//!   request/response shape.
//! - **ProviderRegistry**: named providers, per-call selection, retry, and
//!   contract checks on both sides of the call.
//! - **ToolRegistry**: native tools and sandboxed script tools.
//! - **Engine**: renders templates, calls providers, dispatches actions and
//!   caches responses.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{Engine, OpenAiProvider, PromptTable, ProviderRegistry, RunOptions, ToolRegistry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> runtime::Result<()> {
//! let providers = ProviderRegistry::new("openai");
//! providers.register("openai", Arc::new(OpenAiProvider::builder("sk-...").build()));
//!
//! let engine = Engine::new(
//!     Arc::new(providers),
//!     Arc::new(ToolRegistry::default()),
//!     PromptTable::load("prompts.json")?,
//! );
//! let response = engine
//!     .execute_prompt("summarize", json!({"text": "..."}), RunOptions::new())
//!     .await?;
//! println!("{}", response.content());
//! # Ok(())
//! # }
//! ```

pub mod engine;
mod error;
pub mod model;
pub mod providers;
mod registry;
mod retry;
pub mod tools;

pub use engine::{
    Engine, EngineConfig, FieldType, PlaceholderMode, PromptTable, PromptTemplate, ResponseCache,
    RunOptions, load_tool_table, repair_json,
};
pub use error::{Error, Result};
pub use model::{
    Action, ChatOptions, EngineResponse, Message, ProviderError, ProviderReply, Role, ToolSchema,
};
pub use providers::{
    AnthropicAuth, AnthropicProvider, AzureOpenAiProvider, GoogleAuth, OpenAiProvider,
    OpenRouterProvider, Provider, ProviderConfig, ProviderKind, VertexAnthropicProvider,
    VertexGeminiProvider, VertexLocation,
};
pub use registry::ProviderRegistry;
pub use retry::{RetryConfig, RetryPolicy, retry_async};
pub use tools::{FnTool, NativeTool, Sandbox, ToolBody, ToolError, ToolKind, ToolRegistry};

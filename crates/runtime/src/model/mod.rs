//! Normalized chat types shared by providers, tools and the engine.

pub mod errors;
pub mod types;

pub use errors::ProviderError;
pub use types::{
    Action, ChatOptions, EngineResponse, Message, ProviderReply, Role, ToolSchema, UnparsedArguments,
    split_system,
};

use crate::model::ProviderError;
use crate::tools::ToolError;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the engine and provider registry.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller's request violates the template's declared shape.
    #[error("prompt {prompt}: field {field:?} expected {expected}, got {actual}")]
    RequestFormat {
        prompt: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("invalid tool schema: {reason}")]
    InvalidToolSchema { reason: String },

    #[error("invalid response from {provider}: {reason}")]
    InvalidProviderResponse { provider: String, reason: String },

    #[error("unknown provider {requested:?}; valid providers: {}", .valid.join(", "))]
    UnknownProvider {
        requested: String,
        valid: Vec<String>,
    },

    /// A model-requested action names neither a tool nor a prompt.
    #[error("prompt {prompt}: unknown action {action:?}")]
    UnknownAction {
        prompt: String,
        action: String,
        data: Value,
    },

    /// The backend sent arguments for this action that were not valid JSON.
    /// Earlier actions of the same reply have already run.
    #[error("prompt {prompt}: action {action}: {source}")]
    ActionArguments {
        prompt: String,
        action: String,
        #[source]
        source: ProviderError,
    },

    #[error("prompt {prompt}: exceeded {limit} provider calls")]
    LoopLimitExceeded { prompt: String, limit: usize },

    #[error("prompt {prompt}: execution cancelled")]
    Cancelled { prompt: String },

    /// Strict placeholder mode found a placeholder with no value.
    #[error("prompt {prompt}: no value for placeholder {placeholder:?}")]
    MissingPlaceholder { prompt: String, placeholder: String },

    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A dispatched tool failed; carries the action that triggered it.
    #[error("prompt {prompt}: action {action} failed: {source}")]
    Tool {
        prompt: String,
        action: String,
        data: Value,
        #[source]
        source: ToolError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The tool error behind a failed action, if any.
    pub fn tool_error(&self) -> Option<&ToolError> {
        match self {
            Error::Tool { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

/// Errors that can occur during tool registration and execution.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    #[error("invalid schema for tool {tool}: {reason}")]
    InvalidSchema { tool: String, reason: String },

    /// Action data does not satisfy the tool's declared parameters.
    #[error("invalid params for tool {tool}: {reason}")]
    InvalidParams { tool: String, reason: String },

    #[error("tool {tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    #[error("tool {0} was cancelled")]
    Cancelled(String),

    #[error("capability denied: {0}")]
    CapabilityDenied(String),

    #[error("tool {tool} failed: {reason}")]
    Execution { tool: String, reason: String },
}

impl ToolError {
    pub fn execution(tool: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Execution {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_params(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

impl From<policy::Error> for ToolError {
    fn from(err: policy::Error) -> Self {
        ToolError::CapabilityDenied(err.to_string())
    }
}

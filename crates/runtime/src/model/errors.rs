use thiserror::Error;

/// Errors from LLM provider calls.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// Network failure or non-2xx HTTP status.
    #[error("{provider} call failed ({}): {body}", status_label(.status))]
    Call {
        provider: String,
        status: Option<u16>,
        body: String,
    },

    /// The backend returned syntactically invalid JSON tool arguments.
    #[error("{provider} returned unparseable arguments for tool {tool}: {reason}")]
    ToolArgumentsParse {
        provider: String,
        tool: String,
        reason: String,
    },

    /// The backend reply could not be decoded into its wire type.
    #[error("{provider} response could not be decoded: {reason}")]
    Decode { provider: String, reason: String },

    /// The provider is missing credentials or endpoint settings.
    #[error("{provider} is misconfigured: {reason}")]
    Config { provider: String, reason: String },
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "network".to_string(), |s| format!("HTTP {s}"))
}

impl ProviderError {
    pub fn network(provider: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Call {
            provider: provider.into(),
            status: None,
            body: err.to_string(),
        }
    }

    pub fn status(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Call {
            provider: provider.into(),
            status: Some(status),
            body: body.into(),
        }
    }

    pub fn decode(provider: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            provider: provider.into(),
            reason: err.to_string(),
        }
    }

    pub fn config(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Network failures, rate limits and server errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Call { status: None, .. } => true,
            Self::Call {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

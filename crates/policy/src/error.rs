use thiserror::Error;

/// Errors from checking or loading a [`Policy`](crate::Policy).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A file tool asked for a capability the policy does not grant.
    #[error("capability denied: {0}")]
    Denied(String),

    /// Sandbox limits that would make every script fail.
    #[error("invalid sandbox limits: {0}")]
    Limits(String),

    /// An `fs_read`/`fs_write` rule is not a valid glob.
    #[error("invalid path rule {rule:?}: {reason}")]
    PathRule { rule: String, reason: String },

    /// The `[allow]`/`[deny]`/`[limits]` tables did not deserialize.
    #[error("failed to parse policy: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Capability policy for tool execution.
//!
//! Core principle: **externally authored tool code only sees what the policy
//! grants.** Sandboxed scripts get a fixed set of globals, each behind a
//! capability; native file tools check path scopes against allow-lists.

mod capability;
mod error;
mod limits;
mod policy;

pub use capability::{CapabilityKind, CapabilityRequest};
pub use error::{Error, Result};
pub use limits::SandboxLimits;
pub use policy::{AllowRules, Decision, DenyRules, Policy};

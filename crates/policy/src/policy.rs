//! Policy configuration and enforcement.

use crate::{CapabilityKind, CapabilityRequest, Error, Result, SandboxLimits};
use serde::{Deserialize, Serialize};
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Policy configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Capabilities that are explicitly allowed.
    #[serde(default)]
    pub allow: AllowRules,

    /// Capabilities that are explicitly denied (overrides allow).
    #[serde(default)]
    pub deny: DenyRules,

    /// Resource limits for sandboxed scripts.
    #[serde(default)]
    pub limits: SandboxLimits,
}

/// Rules for allowed capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowRules {
    /// Globals granted to sandboxed scripts.
    #[serde(default = "default_sandbox")]
    pub sandbox: HashSet<CapabilityKind>,

    /// Allowed file read paths: directory prefixes, `dir/**`, or globs.
    #[serde(default)]
    pub fs_read: Vec<String>,

    /// Allowed file write paths, same forms as `fs_read`.
    #[serde(default)]
    pub fs_write: Vec<String>,
}

impl Default for AllowRules {
    fn default() -> Self {
        Self {
            sandbox: default_sandbox(),
            fs_read: Vec::new(),
            fs_write: Vec::new(),
        }
    }
}

fn default_sandbox() -> HashSet<CapabilityKind> {
    CapabilityKind::SANDBOX.into_iter().collect()
}

/// Rules for denied capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenyRules {
    /// Deny all capabilities of these kinds.
    #[serde(default)]
    pub all: HashSet<CapabilityKind>,
}

/// Result of a capability check.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert a denial into an error.
    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny { reason } => Err(Error::Denied(reason)),
        }
    }
}

impl Policy {
    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let policy: Self = toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Create a default restrictive policy: script globals only, no file access.
    pub fn restrictive() -> Self {
        let mut deny_all = HashSet::new();
        deny_all.insert(CapabilityKind::FsWrite);

        Self {
            allow: AllowRules::default(),
            deny: DenyRules { all: deny_all },
            limits: SandboxLimits::default(),
        }
    }

    /// Reject limits that would make every script fail and path rules
    /// that are not valid globs.
    pub fn validate(&self) -> Result<()> {
        if self.limits.timeout_ms == 0 {
            return Err(Error::Limits("timeout_ms must be positive".into()));
        }
        if self.limits.recursion_limit == 0 {
            return Err(Error::Limits("recursion_limit must be positive".into()));
        }
        for rule in self.allow.fs_read.iter().chain(&self.allow.fs_write) {
            Pattern::new(rule).map_err(|e| Error::PathRule {
                rule: rule.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Check if a capability request is allowed.
    pub fn check(&self, request: &CapabilityRequest) -> Decision {
        // Check explicit denials first
        if self.deny.all.contains(&request.kind) {
            return Decision::Deny {
                reason: format!("{:?} is denied by policy", request.kind),
            };
        }

        let allowed = match request.kind {
            CapabilityKind::Console | CapabilityKind::Timers | CapabilityKind::ToolSchemas => {
                self.allow.sandbox.contains(&request.kind)
            }
            CapabilityKind::FsRead => check_path_allowed(&self.allow.fs_read, &request.scope),
            CapabilityKind::FsWrite => check_path_allowed(&self.allow.fs_write, &request.scope),
        };

        if allowed {
            Decision::Allow
        } else {
            Decision::Deny {
                reason: format!(
                    "{:?} not in allowlist{}",
                    request.kind,
                    request
                        .scope
                        .as_ref()
                        .map(|s| format!(" (scope: {s})"))
                        .unwrap_or_default()
                ),
            }
        }
    }

    /// Whether a sandbox global is granted.
    pub fn grants(&self, kind: CapabilityKind) -> bool {
        self.check(&CapabilityRequest::new(kind)).is_allowed()
    }
}

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn check_path_allowed(allowlist: &[String], scope: &Option<String>) -> bool {
    let Some(path) = scope else {
        return !allowlist.is_empty(); // No scope = any path, allow if list non-empty
    };

    let path = Path::new(path);
    // Parent traversal would escape any prefix rule.
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return false;
    }
    let path = without_cur_dir(path);

    allowlist.iter().any(|rule| rule_allows(rule, &path))
}

fn rule_allows(rule: &str, path: &Path) -> bool {
    if rule == "*" || rule == "**" {
        return true;
    }
    // dir/** and plain dir rules cover everything under dir.
    let base = rule.strip_suffix("/**").unwrap_or(rule);
    if !is_glob(base) {
        return under(Path::new(base), path);
    }

    let rule = rule.strip_prefix("./").unwrap_or(rule);
    Pattern::new(rule).is_ok_and(|pattern| pattern.matches_path_with(path, MATCH))
}

/// Component-wise prefix test, so `/tmp` never covers `/tmpfoo`.
fn under(base: &Path, path: &Path) -> bool {
    let base = without_cur_dir(base);
    if base.as_os_str().is_empty() {
        return path.is_relative();
    }
    path.starts_with(&base)
}

fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn is_glob(rule: &str) -> bool {
    rule.contains(['*', '?', '['])
}

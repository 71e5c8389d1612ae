//! Resource limits for sandboxed script execution.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds applied to every sandboxed script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Wall-clock budget for one script run, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum iterations of any single loop.
    pub loop_iteration_limit: u64,
    /// Maximum call depth.
    pub recursion_limit: usize,
    /// Maximum number of timer callbacks fired after the script body.
    pub max_timer_callbacks: u32,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            loop_iteration_limit: 1_000_000,
            recursion_limit: 512,
            max_timer_callbacks: 1_000,
        }
    }
}

impl SandboxLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

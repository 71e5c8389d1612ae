use serde::{Deserialize, Serialize};

/// Capability types that can be granted or denied.
///
/// `Console`, `Timers` and `ToolSchemas` gate the globals injected into a
/// sandboxed script. `FsRead` and `FsWrite` gate the native file tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Console,
    Timers,
    ToolSchemas,
    FsRead,
    FsWrite,
}

impl CapabilityKind {
    /// Capabilities that apply to sandboxed script globals.
    pub const SANDBOX: [CapabilityKind; 3] = [Self::Console, Self::Timers, Self::ToolSchemas];
}

/// A capability request with optional scope.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    pub kind: CapabilityKind,
    pub scope: Option<String>, // e.g. a file path
}

impl CapabilityRequest {
    pub fn new(kind: CapabilityKind) -> Self {
        Self { kind, scope: None }
    }

    pub fn with_scope(kind: CapabilityKind, scope: impl Into<String>) -> Self {
        Self {
            kind,
            scope: Some(scope.into()),
        }
    }

    pub fn console() -> Self {
        Self::new(CapabilityKind::Console)
    }

    pub fn timers() -> Self {
        Self::new(CapabilityKind::Timers)
    }

    pub fn tool_schemas() -> Self {
        Self::new(CapabilityKind::ToolSchemas)
    }

    pub fn fs_read(path: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::FsRead, path)
    }

    pub fn fs_write(path: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::FsWrite, path)
    }
}

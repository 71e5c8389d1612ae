//! Tool registry and sandboxed execution.

pub mod errors;
mod fs;
mod registry;
mod sandbox;
mod types;
mod validate;

pub use errors::ToolError;
pub use fs::{ReadFile, WriteFile, file_tools};
pub use registry::ToolRegistry;
pub use sandbox::Sandbox;
pub use types::{FnTool, NativeTool, Tool, ToolBody, ToolKind};

pub(crate) use validate::json_type;

//! Native `read_file` / `write_file` tools gated by path allow-lists.

use super::{NativeTool, ToolBody, ToolError};
use crate::model::ToolSchema;
use async_trait::async_trait;
use policy::{CapabilityRequest, Policy};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Deserialize)]
struct ReadArgs {
    path: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

fn args<T: serde::de::DeserializeOwned>(tool: &str, params: Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::invalid_params(tool, e.to_string()))
}

/// Reads a UTF-8 file the policy allows.
pub struct ReadFile {
    policy: Arc<Policy>,
}

impl ReadFile {
    pub const NAME: &'static str = "read_file";

    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    pub fn schema() -> ToolSchema {
        ToolSchema::new(
            Self::NAME,
            "Read a text file and return its contents",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path of the file to read"}
                },
                "required": ["path"]
            }),
        )
    }
}

#[async_trait]
impl NativeTool for ReadFile {
    async fn call(&self, params: Value) -> Result<Value, ToolError> {
        let ReadArgs { path } = args(Self::NAME, params)?;
        self.policy
            .check(&CapabilityRequest::fs_read(&path))
            .into_result()?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::execution(Self::NAME, format!("{path}: {e}")))?;
        Ok(Value::String(content))
    }
}

/// Writes a file the policy allows, creating parent directories.
pub struct WriteFile {
    policy: Arc<Policy>,
}

impl WriteFile {
    pub const NAME: &'static str = "write_file";

    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    pub fn schema() -> ToolSchema {
        ToolSchema::new(
            Self::NAME,
            "Write text content to a file",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path of the file to write"},
                    "content": {"type": "string", "description": "Text to write"}
                },
                "required": ["path", "content"]
            }),
        )
    }
}

#[async_trait]
impl NativeTool for WriteFile {
    async fn call(&self, params: Value) -> Result<Value, ToolError> {
        let WriteArgs { path, content } = args(Self::NAME, params)?;
        self.policy
            .check(&CapabilityRequest::fs_write(&path))
            .into_result()?;
        let parent = std::path::Path::new(&path).parent();
        if let Some(parent) = parent.filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::execution(Self::NAME, format!("{path}: {e}")))?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| ToolError::execution(Self::NAME, format!("{path}: {e}")))?;
        Ok(json!({"path": path, "bytes": content.len()}))
    }
}

/// Schema and body pairs for both file tools.
pub fn file_tools(policy: Arc<Policy>) -> [(ToolSchema, ToolBody); 2] {
    [
        (ReadFile::schema(), ToolBody::native(ReadFile::new(policy.clone()))),
        (WriteFile::schema(), ToolBody::native(WriteFile::new(policy))),
    ]
}

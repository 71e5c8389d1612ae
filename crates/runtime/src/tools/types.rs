//! Tool records and native tool bodies.

use super::ToolError;
use super::validate::ParamsValidator;
use crate::model::ToolSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A tool implemented in Rust.
///
/// Native tools bypass the sandbox and run as ordinary async calls.
#[async_trait]
pub trait NativeTool: Send + Sync {
    async fn call(&self, params: Value) -> Result<Value, ToolError>;
}

type BoxedCall =
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>> + Send + Sync;

/// Adapts an async closure into a [`NativeTool`].
pub struct FnTool {
    call: Box<BoxedCall>,
}

impl FnTool {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            call: Box::new(move |params| Box::pin(f(params))),
        }
    }
}

#[async_trait]
impl NativeTool for FnTool {
    async fn call(&self, params: Value) -> Result<Value, ToolError> {
        (self.call)(params).await
    }
}

/// The executable part of a tool.
#[derive(Clone)]
pub enum ToolBody {
    Native(Arc<dyn NativeTool>),
    /// JavaScript source evaluated in the sandbox.
    Script(String),
}

impl ToolBody {
    pub fn native(tool: impl NativeTool + 'static) -> Self {
        ToolBody::Native(Arc::new(tool))
    }

    pub fn script(source: impl Into<String>) -> Self {
        ToolBody::Script(source.into())
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolBody::Native(_) => ToolKind::Native,
            ToolBody::Script(_) => ToolKind::Script,
        }
    }
}

impl std::fmt::Debug for ToolBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolBody::Native(_) => f.write_str("Native(..)"),
            ToolBody::Script(src) => f.debug_tuple("Script").field(&src.len()).finish(),
        }
    }
}

/// Whether a tool runs sandboxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Native,
    Script,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Native => write!(f, "native"),
            ToolKind::Script => write!(f, "script"),
        }
    }
}

/// A registered tool.
#[derive(Debug, Clone)]
pub struct Tool {
    pub schema: ToolSchema,
    pub body: ToolBody,
    params: ParamsValidator,
}

impl Tool {
    /// Compile the parameters schema; a schema that does not compile is rejected.
    pub(crate) fn new(schema: ToolSchema, body: ToolBody) -> Result<Self, ToolError> {
        let params = ParamsValidator::compile(&schema)?;
        Ok(Self {
            schema,
            body,
            params,
        })
    }

    /// Check action data against the declared parameters.
    pub fn check_params(&self, params: &Value) -> Result<(), ToolError> {
        self.params.check(&self.schema.name, params)
    }

    pub fn kind(&self) -> ToolKind {
        self.body.kind()
    }

    pub fn is_sandboxed(&self) -> bool {
        self.kind() == ToolKind::Script
    }
}

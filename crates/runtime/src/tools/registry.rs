//! Named tool table with validated, sandboxed execution.

use super::{Sandbox, Tool, ToolBody, ToolError};
use crate::model::ToolSchema;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registry of tools available to the engine.
///
/// Lookups take a shared lock and never block each other; registration takes
/// the write lock for a single check-then-insert. No lock is held while a tool
/// runs.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<Tool>>>,
    sandbox: Sandbox,
}

impl ToolRegistry {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            sandbox,
        }
    }

    /// Register a tool under `name`.
    ///
    /// The schema's own `name` is replaced by `name`, so the registry key and
    /// the advertised name always agree.
    pub fn register(
        &self,
        name: impl Into<String>,
        mut schema: ToolSchema,
        body: ToolBody,
    ) -> Result<(), ToolError> {
        let name = name.into();
        schema.name = name.clone();
        schema.validate().map_err(|reason| ToolError::InvalidSchema {
            tool: name.clone(),
            reason,
        })?;

        let tool = Tool::new(schema, body)?;

        let kind = tool.kind();
        let mut tools = self.tools.write();
        if tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        tools.insert(name.clone(), Arc::new(tool));
        drop(tools);

        debug!(tool = %name, %kind, "registered tool");
        Ok(())
    }

    /// Schemas of all registered tools, ordered by name.
    pub fn describe(&self) -> Vec<ToolSchema> {
        self.tools
            .read()
            .values()
            .map(|tool| tool.schema.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Validate `params` against the tool's schema, then run its body.
    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.check_params(&params)?;
        debug!(tool = name, kind = %tool.kind(), "executing tool");

        match &tool.body {
            ToolBody::Native(native) => tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ToolError::Cancelled(name.to_string())),
                result = native.call(params) => result,
            },
            ToolBody::Script(source) => {
                self.sandbox
                    .run(name, source, &params, self.schema_view(), cancel)
                    .await
            }
        }
    }

    /// The read-only `tools` view handed to scripts: `{name: {type, schema}}`.
    fn schema_view(&self) -> Value {
        let tools = self.tools.read();
        let view: Map<String, Value> = tools
            .iter()
            .map(|(name, tool)| {
                let ty = tool
                    .schema
                    .parameters
                    .get("type")
                    .cloned()
                    .unwrap_or(Value::Null);
                (name.clone(), json!({"type": ty, "schema": tool.schema}))
            })
            .collect();
        Value::Object(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pair_schema() -> ToolSchema {
        ToolSchema::new(
            "pair",
            "joins a and b",
            json!({
                "type": "object",
                "properties": {"a": {"type": "string"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }),
        )
    }

    #[tokio::test]
    async fn missing_param_fails_before_body_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = ToolRegistry::default();
        registry
            .register(
                "pair",
                pair_schema(),
                ToolBody::native(FnTool::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Value::Null) }
                })),
            )
            .unwrap();

        let err = registry
            .execute("pair", json!({"a": "x"}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enum_violation_fails_before_script_runs() {
        let registry = ToolRegistry::default();
        registry
            .register(
                "speed",
                ToolSchema::new(
                    "",
                    "picks a mode",
                    json!({
                        "type": "object",
                        "properties": {"mode": {"type": "string", "enum": ["fast", "slow"]}},
                        "required": ["mode"]
                    }),
                ),
                ToolBody::script("params.mode"),
            )
            .unwrap();

        let cancel = CancellationToken::new();
        let err = registry
            .execute("speed", json!({"mode": "bogus"}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams { ref tool, .. } if tool == "speed"));
        let out = registry.execute("speed", json!({"mode": "slow"}), &cancel).await.unwrap();
        assert_eq!(out, json!("slow"));
    }

    #[test]
    fn uncompilable_parameters_are_rejected() {
        let registry = ToolRegistry::default();
        let err = registry
            .register(
                "bad",
                ToolSchema::new("bad", "broken", json!({"type": "object", "required": "a"})),
                ToolBody::script("1"),
            )
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidSchema { .. }));
        assert!(!registry.contains("bad"));
    }

    #[tokio::test]
    async fn script_tool_sees_params() {
        let registry = ToolRegistry::default();
        registry
            .register("pair", pair_schema(), ToolBody::script("params.a + params.b"))
            .unwrap();
        let out = registry
            .execute("pair", json!({"a": "x", "b": 1}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, json!("x1"));
    }

    #[tokio::test]
    async fn script_tool_sees_other_schemas() {
        let registry = ToolRegistry::default();
        registry
            .register("pair", pair_schema(), ToolBody::script("1"))
            .unwrap();
        registry
            .register(
                "introspect",
                ToolSchema::new("", "lists tools", json!({"type": "object"})),
                ToolBody::script("Object.keys(tools).join(',') + ':' + tools.pair.type"),
            )
            .unwrap();
        let out = registry
            .execute("introspect", json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, json!("introspect,pair:object"));
    }

    #[tokio::test]
    async fn unknown_tool() {
        let err = ToolRegistry::default()
            .execute("nope", json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("nope".into()));
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let registry = ToolRegistry::default();
        let err = registry
            .register("bad", ToolSchema::new("bad", "", json!({})), ToolBody::script("1"))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidSchema { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn describe_uses_registry_names() {
        let registry = ToolRegistry::default();
        registry
            .register("b_tool", pair_schema(), ToolBody::script("1"))
            .unwrap();
        registry
            .register("a_tool", pair_schema(), ToolBody::script("1"))
            .unwrap();
        let names: Vec<_> = registry.describe().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a_tool", "b_tool"]);
    }

    #[test]
    fn concurrent_registration() {
        let registry = Arc::new(ToolRegistry::default());

        let distinct: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|name| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.register(name, pair_schema(), ToolBody::script("1"))
                })
            })
            .collect();
        for handle in distinct {
            handle.join().unwrap().unwrap();
        }
        let names: Vec<_> = registry.describe().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["left", "right"]);

        let same: Vec<_> = (0..2)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.register("shared", pair_schema(), ToolBody::script("1"))
                })
            })
            .collect();
        let results: Vec<_> = same.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(ToolError::DuplicateTool(name)) if name == "shared"))
        );
    }
}

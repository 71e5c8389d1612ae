//! Checking action data against a tool's declared parameters.

use super::ToolError;
use crate::model::ToolSchema;
use jsonschema::Validator;
use serde_json::Value;
use std::sync::Arc;

/// A tool's `parameters` schema, compiled once at registration.
#[derive(Clone)]
pub(crate) struct ParamsValidator(Arc<Validator>);

impl ParamsValidator {
    pub(crate) fn compile(schema: &ToolSchema) -> Result<Self, ToolError> {
        jsonschema::validator_for(&schema.parameters)
            .map(|validator| Self(Arc::new(validator)))
            .map_err(|e| ToolError::InvalidSchema {
                tool: schema.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Every violation is reported, joined with `; `.
    pub(crate) fn check(&self, tool: &str, params: &Value) -> Result<(), ToolError> {
        if !params.is_object() {
            return Err(ToolError::invalid_params(
                tool,
                format!("expected an object, got {}", json_type(params)),
            ));
        }

        let violations: Vec<String> = self
            .0
            .iter_errors(params)
            .map(|error| error.to_string())
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ToolError::invalid_params(tool, violations.join("; ")))
        }
    }
}

impl std::fmt::Debug for ParamsValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ParamsValidator(..)")
    }
}

/// JSON type name of a value.
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

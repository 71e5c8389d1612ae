//! Startup loading of the prompt table and the tool table.

use super::template::PromptTemplate;
use crate::error::{Error, Result};
use crate::model::ToolSchema;
use crate::tools::{ToolBody, ToolRegistry};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

/// Named prompt templates, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptTable {
    entries: Vec<(String, PromptTemplate)>,
}

impl PromptTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prompt; a later prompt with the same name replaces the earlier one
    /// in place.
    pub fn insert(&mut self, name: impl Into<String>, template: PromptTemplate) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = template,
            None => self.entries.push((name, template)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, template)| template)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PromptTemplate)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `[{"name": {template}}, ...]`.
    pub fn parse(json: &str) -> Result<Self> {
        let raw: Vec<BTreeMap<String, PromptTemplate>> = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid prompt table: {e}")))?;
        let mut table = Self::new();
        for entry in raw {
            if entry.len() != 1 {
                return Err(Error::Config(format!(
                    "prompt table entries must have exactly one key, found {}",
                    entry.len()
                )));
            }
            table.entries.extend(entry);
        }
        Ok(table)
    }

    /// Load the prompt table; a missing file yields an empty table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let Some(json) = read_optional(path, "prompt table")? else {
            return Ok(Self::new());
        };
        let table = Self::parse(&json)?;
        info!(path = %path.display(), prompts = table.len(), "loaded prompt table");
        Ok(table)
    }
}

/// One tool table entry: a schema plus the script that implements it.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolEntry {
    pub schema: ToolSchema,
    pub script: String,
}

/// Parse `{"name": {"schema": {...}, "script": "..."}}`.
pub fn parse_tool_table(json: &str) -> Result<BTreeMap<String, ToolEntry>> {
    serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid tool table: {e}")))
}

/// Register every scripted tool in the file at `path`; returns how many were
/// added. A missing file registers nothing.
pub fn load_tool_table(path: impl AsRef<Path>, registry: &ToolRegistry) -> Result<usize> {
    let path = path.as_ref();
    let Some(json) = read_optional(path, "tool table")? else {
        return Ok(0);
    };
    let entries = parse_tool_table(&json)?;
    let count = entries.len();
    for (name, entry) in entries {
        registry
            .register(name, entry.schema, ToolBody::script(entry.script))
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    }
    info!(path = %path.display(), tools = count, "loaded tool table");
    Ok(count)
}

fn read_optional(path: &Path, what: &str) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "{what} not found; starting empty");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPTS: &str = r#"[
        {"summarize": {"system": "Summarize {text}", "user": "go", "requestFormat": {"text": "string"}}},
        {"greet": {"system": "Hi ${name}", "user": "hello", "options": {"model": "m"}}}
    ]"#;

    #[test]
    fn prompt_table_keeps_file_order() {
        let table = PromptTable::parse(PROMPTS).unwrap();
        let names: Vec<_> = table.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["summarize", "greet"]);
        let greet = table.get("greet").unwrap();
        assert_eq!(greet.system, "Hi ${name}");
        assert_eq!(
            greet.options.as_ref().and_then(|o| o.model.as_deref()),
            Some("m")
        );
    }

    #[test]
    fn prompt_entry_with_two_keys_is_rejected() {
        let err = PromptTable::parse(r#"[{"a": {}, "b": {}}]"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_prompt_table_is_config_error() {
        assert!(matches!(
            PromptTable::parse("{not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_files_are_empty() {
        let dir = std::env::temp_dir().join(format!("sb-missing-{}", uuid::Uuid::new_v4()));
        assert!(PromptTable::load(dir.join("prompts.json")).unwrap().is_empty());
        let registry = ToolRegistry::default();
        assert_eq!(load_tool_table(dir.join("tools.json"), &registry).unwrap(), 0);
    }

    #[test]
    fn tool_table_registers_scripts() {
        let dir = std::env::temp_dir().join(format!("sb-tools-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tools.json");
        std::fs::write(
            &path,
            r#"{"add": {
                "schema": {"description": "adds", "parameters": {"type": "object", "properties": {"a": {"type": "number"}}, "required": ["a"]}},
                "script": "params.a + 1"
            }}"#,
        )
        .unwrap();

        let registry = ToolRegistry::default();
        assert_eq!(load_tool_table(&path, &registry).unwrap(), 1);
        let tool = registry.get("add").unwrap();
        assert!(tool.is_sandboxed());
        assert_eq!(tool.schema.name, "add");

        // Loading twice trips the duplicate check.
        let err = load_tool_table(&path, &registry).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("add")));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn tool_entry_without_script_is_rejected() {
        let err = parse_tool_table(r#"{"t": {"schema": {}}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

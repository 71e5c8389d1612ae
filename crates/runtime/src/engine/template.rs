//! Prompt templates: request shape checks and placeholder rendering.

use crate::error::{Error, Result};
use crate::model::ChatOptions;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+)\}|\{(\w+)\}").expect("valid placeholder regex"));

/// A reusable system/user message skeleton.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub user: String,
    #[serde(
        default,
        rename = "requestFormat",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_format: Option<BTreeMap<String, FieldType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

/// Declared type of one request field: a single type name or a list of them.
///
/// Type names follow JavaScript `typeof` (`string`, `number`, `boolean`,
/// `object`, `undefined`), plus `array`, `null`, `integer` and `any`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    One(String),
    Any(Vec<String>),
}

impl FieldType {
    fn accepts(&self, value: Option<&Value>) -> bool {
        match self {
            FieldType::One(name) => type_matches(name, value),
            FieldType::Any(names) => names.iter().any(|name| type_matches(name, value)),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::One(name) => f.write_str(name),
            FieldType::Any(names) => write!(f, "one of {}", names.join(", ")),
        }
    }
}

/// How a placeholder with no value is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderMode {
    /// Substitute an empty string.
    #[default]
    Lenient,
    /// Fail with [`Error::MissingPlaceholder`].
    Strict,
}

/// The `typeof` name of a request value; a missing field is `undefined`.
fn type_of(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::String(_)) => "string",
        Some(Value::Number(_)) => "number",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Null | Value::Array(_) | Value::Object(_)) => "object",
    }
}

fn type_matches(expected: &str, value: Option<&Value>) -> bool {
    match (expected, value) {
        ("any", Some(_)) => true,
        ("array", Some(v)) => v.is_array(),
        ("null", Some(v)) => v.is_null(),
        ("integer", Some(v)) => v.is_i64() || v.is_u64(),
        (expected, value) => type_of(value) == expected,
    }
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            ..Self::default()
        }
    }

    /// Check `request` against the declared `requestFormat`, if any.
    pub fn check_request(&self, prompt: &str, request: &Map<String, Value>) -> Result<()> {
        let Some(format) = &self.request_format else {
            return Ok(());
        };
        for (field, expected) in format {
            let value = request.get(field);
            if !expected.accepts(value) {
                return Err(Error::RequestFormat {
                    prompt: prompt.to_string(),
                    field: field.clone(),
                    expected: expected.to_string(),
                    actual: type_of(value).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Template options with `overrides` applied on top.
    pub fn merged_options(&self, overrides: &ChatOptions) -> ChatOptions {
        self.options.clone().unwrap_or_default().merged(overrides)
    }
}

/// Substitute `${name}` and `{name}` placeholders from `values`.
///
/// String values are inserted verbatim, anything else as compact JSON.
pub fn render(
    template: &str,
    values: &Map<String, Value>,
    mode: PlaceholderMode,
    prompt: &str,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        let key = placeholder_key(&caps);
        match values.get(key) {
            Some(Value::String(text)) => out.push_str(text),
            Some(value) => out.push_str(&value.to_string()),
            None if mode == PlaceholderMode::Strict => {
                return Err(Error::MissingPlaceholder {
                    prompt: prompt.to_string(),
                    placeholder: key.to_string(),
                });
            }
            None => {}
        }
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn placeholder_key<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map_or("", |m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn renders_both_placeholder_styles() {
        let out = render(
            "Hi ${name}, you are {age}",
            &values(json!({"name": "Ann", "age": 30})),
            PlaceholderMode::Lenient,
            "greet",
        )
        .unwrap();
        assert_eq!(out, "Hi Ann, you are 30");
    }

    #[test]
    fn missing_placeholder_is_empty_when_lenient() {
        let out = render("Hi ${name}", &Map::new(), PlaceholderMode::Lenient, "greet").unwrap();
        assert_eq!(out, "Hi ");
    }

    #[test]
    fn missing_placeholder_fails_when_strict() {
        let err = render("Hi {name}", &Map::new(), PlaceholderMode::Strict, "greet").unwrap_err();
        assert!(
            matches!(err, Error::MissingPlaceholder { ref placeholder, .. } if placeholder == "name")
        );
    }

    #[test]
    fn structured_values_render_as_json() {
        let out = render(
            "{items}",
            &values(json!({"items": [1, "a"]})),
            PlaceholderMode::Lenient,
            "p",
        )
        .unwrap();
        assert_eq!(out, r#"[1,"a"]"#);
    }

    #[test]
    fn request_format_single_type() {
        let template: PromptTemplate = serde_json::from_value(json!({
            "system": "s",
            "user": "u",
            "requestFormat": {"code": "string"}
        }))
        .unwrap();
        assert!(template.check_request("p", &values(json!({"code": "x"}))).is_ok());

        let err = template
            .check_request("p", &values(json!({"code": 5})))
            .unwrap_err();
        match err {
            Error::RequestFormat {
                field,
                expected,
                actual,
                ..
            } => {
                assert_eq!(field, "code");
                assert_eq!(expected, "string");
                assert_eq!(actual, "number");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn request_format_type_list_and_missing_field() {
        let template: PromptTemplate = serde_json::from_value(json!({
            "system": "s",
            "user": "u",
            "requestFormat": {"limit": ["number", "undefined"], "tags": "array"}
        }))
        .unwrap();
        assert!(template.check_request("p", &values(json!({"tags": []}))).is_ok());
        assert!(
            template
                .check_request("p", &values(json!({"limit": 3, "tags": ["a"]})))
                .is_ok()
        );

        let err = template
            .check_request("p", &values(json!({"limit": 3})))
            .unwrap_err();
        assert!(matches!(err, Error::RequestFormat { ref actual, .. } if actual == "undefined"));
    }

    #[test]
    fn options_merge_caller_wins() {
        let mut template = PromptTemplate::new("s", "u");
        template.options = Some(ChatOptions::default().with_model("base"));
        let merged = template.merged_options(&ChatOptions::default().with_model("mine"));
        assert_eq!(merged.model.as_deref(), Some("mine"));
        let kept = template.merged_options(&ChatOptions::default());
        assert_eq!(kept.model.as_deref(), Some("base"));
    }
}

//! Turning provider replies into engine responses. Never fails.

use super::repair::repair_json;
use crate::model::{Action, EngineResponse, ProviderReply};
use serde_json::{Map, Value};
use tracing::warn;

/// Normalize a reply.
///
/// Raw text is parsed strictly, then repaired, then wrapped as plain
/// content. A structured reply without native tool calls may still carry
/// the prompt protocol's `{content, actions}` object inside its text.
pub(crate) fn parse_reply(reply: ProviderReply) -> EngineResponse {
    match reply {
        ProviderReply::Raw(text) => match embedded(&text) {
            Some(response) => response,
            None => {
                warn!(raw = %text, "model output is not a response object; using it as content");
                EngineResponse::text(text)
            }
        },
        ProviderReply::Structured(response) if !response.actions().is_empty() => response,
        ProviderReply::Structured(response) => {
            embedded(response.content()).unwrap_or(response)
        }
    }
}

/// Parse `text` as a `{content, actions}` object, repairing it if needed.
fn embedded(text: &str) -> Option<EngineResponse> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with("```")) {
        return None;
    }
    match repair_json(trimmed)? {
        Value::Object(object) => from_object(object),
        _ => None,
    }
}

fn from_object(mut object: Map<String, Value>) -> Option<EngineResponse> {
    if !object.contains_key("content") && !object.contains_key("actions") {
        return None;
    }

    let content = match object.remove("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    };

    let actions = match object.remove("actions") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => match serde_json::from_value::<Vec<Action>>(value) {
            Ok(actions) => actions,
            Err(e) => {
                warn!(error = %e, "ignoring malformed actions list");
                return None;
            }
        },
    };

    Some(EngineResponse::new(content, actions))
}

//! OpenAI → Anthropic response conversion (non-streaming)

use crate::{Result, TranscodeError};
use serde_json::{json, Map, Value};
use tracing::warn;

/// Convert an OpenAI chat-completions response body into an Anthropic
/// messages response.
///
/// `model` is the name the client originally requested; it is echoed back
/// regardless of what the upstream called the model.
pub fn openai_to_anthropic(response: &Value, model: &str) -> Result<Value> {
    let resp = response
        .as_object()
        .ok_or(TranscodeError::NotAnObject("response"))?;

    let mut out = Map::new();
    out.insert(
        "id".to_string(),
        resp.get("id").cloned().unwrap_or_else(|| json!("")),
    );
    out.insert("type".to_string(), json!("message"));
    out.insert("role".to_string(), json!("assistant"));
    out.insert("model".to_string(), json!(model));

    let mut content: Vec<Value> = Vec::new();
    let mut stop_reason = Value::Null;

    if let Some(choice) = resp
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    {
        if let Some(message) = choice.get("message") {
            if let Some(message_content) = message.get("content") {
                content.extend(openai_content_to_text_blocks(message_content));
            }

            if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
                for call in tool_calls {
                    content.push(tool_call_to_tool_use(call));
                }
            }
        }

        stop_reason = match choice.get("finish_reason").and_then(Value::as_str) {
            Some(reason) => json!(map_finish_reason(reason)),
            None => Value::Null,
        };
    }

    out.insert("content".to_string(), Value::Array(content));
    out.insert("stop_reason".to_string(), stop_reason);
    out.insert("stop_sequence".to_string(), Value::Null);

    let usage = resp.get("usage");
    out.insert(
        "usage".to_string(),
        json!({
            "input_tokens": usage_field(usage, "prompt_tokens"),
            "output_tokens": usage_field(usage, "completion_tokens"),
        }),
    );

    Ok(Value::Object(out))
}

/// Map an OpenAI finish reason onto an Anthropic stop reason.
pub fn map_finish_reason(reason: &str) -> &'static str {
    match reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        "content_filter" => "stop_sequence",
        "tool_calls" => "tool_use",
        _ => "end_turn",
    }
}

/// OpenAI message content is either a string or an array of typed parts.
/// A string becomes one text block; each non-empty part becomes its own.
fn openai_content_to_text_blocks(content: &Value) -> Vec<Value> {
    match content {
        Value::String(text) if !text.is_empty() => {
            vec![json!({"type": "text", "text": text})]
        }
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| {
                part.get("text")
                    .and_then(Value::as_str)
                    .or_else(|| part.get("content").and_then(Value::as_str))
            })
            .filter(|text| !text.is_empty())
            .map(|text| json!({"type": "text", "text": text}))
            .collect(),
        _ => Vec::new(),
    }
}

fn tool_call_to_tool_use(call: &Value) -> Value {
    let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
    let function = call.get("function");
    let name = function
        .and_then(|f| f.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let input = function
        .and_then(|f| f.get("arguments"))
        .and_then(Value::as_str)
        .and_then(|arguments| match serde_json::from_str::<Value>(arguments) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(tool = %name, error = %e, "tool call arguments are not valid JSON");
                None
            }
        })
        .unwrap_or_else(|| json!({}));

    json!({"type": "tool_use", "id": id, "name": name, "input": input})
}

fn usage_field(usage: Option<&Value>, field: &str) -> u64 {
    usage
        .and_then(|u| u.get(field))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

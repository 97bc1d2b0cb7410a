//! Anthropic → OpenAI request conversion

use crate::{Result, TranscodeError};
use serde_json::{json, Map, Value};

/// Convert an Anthropic `/v1/messages` request body into an OpenAI
/// `/v1/chat/completions` body.
///
/// The `system` field (string or array of text blocks) becomes a leading
/// `system` message. Assistant `tool_use` blocks become `tool_calls`; user
/// `tool_result` blocks become separate `role:"tool"` messages. Fields with
/// no OpenAI counterpart (`thinking`, `metadata`, `top_k`) are dropped.
pub fn anthropic_to_openai(request: &Value) -> Result<Value> {
    let req = request
        .as_object()
        .ok_or(TranscodeError::NotAnObject("request"))?;

    let mut messages: Vec<Value> = Vec::new();

    if let Some(system) = req.get("system") {
        let text = flatten_text(system);
        if !text.is_empty() {
            messages.push(json!({"role": "system", "content": text}));
        }
    }

    let empty = Vec::new();
    let source_messages = req
        .get("messages")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    for message in source_messages {
        let role = message
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or("user");
        let content = message.get("content").unwrap_or(&Value::Null);

        if role == "assistant" && has_block(content, "tool_use") {
            convert_assistant_tool_use(content, &mut messages);
            continue;
        }

        if role == "user" && has_block(content, "tool_result") {
            convert_user_tool_results(content, &mut messages);
            continue;
        }

        messages.push(json!({"role": role, "content": flatten_text(content)}));
    }

    let mut out = Map::new();
    if let Some(model) = req.get("model") {
        out.insert("model".to_string(), model.clone());
    }
    out.insert("messages".to_string(), Value::Array(messages));

    // Sampling parameters carry over verbatim.
    for field in ["max_tokens", "temperature", "top_p", "stream"] {
        if let Some(value) = req.get(field) {
            out.insert(field.to_string(), value.clone());
        }
    }

    if let Some(stop) = req.get("stop_sequences").and_then(Value::as_array) {
        if stop.len() == 1 {
            out.insert("stop".to_string(), stop[0].clone());
        } else if !stop.is_empty() {
            out.insert("stop".to_string(), Value::Array(stop.clone()));
        }
    }

    if let Some(tools) = req.get("tools").and_then(Value::as_array) {
        if !tools.is_empty() {
            out.insert("tools".to_string(), convert_tools(tools));
        }
    }

    if let Some(tool_choice) = req.get("tool_choice") {
        out.insert("tool_choice".to_string(), convert_tool_choice(tool_choice));
    }

    Ok(Value::Object(out))
}

/// Assistant message containing `tool_use` blocks: text (if any) plus a
/// `tool_calls` array. OpenAI expects `content` omitted when the message is
/// tool calls only.
fn convert_assistant_tool_use(content: &Value, messages: &mut Vec<Value>) {
    let text = flatten_text(content);

    let mut tool_calls = Vec::new();
    for block in blocks_of(content, "tool_use") {
        let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
        let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
        let arguments = block
            .get("input")
            .map(|input| serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()))
            .unwrap_or_else(|| "{}".to_string());

        tool_calls.push(json!({
            "id": id,
            "type": "function",
            "function": {"name": name, "arguments": arguments},
        }));
    }

    let mut message = Map::new();
    message.insert("role".to_string(), json!("assistant"));
    if !text.is_empty() {
        message.insert("content".to_string(), json!(text));
    }
    message.insert("tool_calls".to_string(), Value::Array(tool_calls));
    messages.push(Value::Object(message));
}

/// User message containing `tool_result` blocks: one `role:"tool"` message
/// per result, followed by a plain user message when text blocks were
/// present.
fn convert_user_tool_results(content: &Value, messages: &mut Vec<Value>) {
    let mut texts: Vec<&str> = Vec::new();

    if let Some(blocks) = content.as_array() {
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("tool_result") => {
                    let tool_call_id = block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let result_content = match block.get("content") {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => serde_json::to_string(other).unwrap_or_default(),
                        None => String::new(),
                    };
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": tool_call_id,
                        "content": result_content,
                    }));
                }
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        texts.push(text);
                    }
                }
                _ => {}
            }
        }
    }

    if !texts.is_empty() {
        messages.push(json!({"role": "user", "content": texts.join("\n")}));
    }
}

fn convert_tools(tools: &[Value]) -> Value {
    let converted: Vec<Value> = tools
        .iter()
        .filter_map(|tool| {
            let name = tool.get("name")?;
            Some(json!({
                "type": "function",
                "function": {
                    "name": name,
                    "description": tool.get("description").cloned().unwrap_or(Value::Null),
                    "parameters": tool.get("input_schema").cloned().unwrap_or(Value::Null),
                },
            }))
        })
        .collect();
    Value::Array(converted)
}

/// `{type:"auto"}` → `"auto"`, `{type:"any"}` → `"required"`,
/// `{type:"tool", name}` → function selector. Unknown shapes pass through.
fn convert_tool_choice(tool_choice: &Value) -> Value {
    match tool_choice.get("type").and_then(Value::as_str) {
        Some("auto") => json!("auto"),
        Some("any") => json!("required"),
        Some("tool") => match tool_choice.get("name").and_then(Value::as_str) {
            Some(name) => json!({"type": "function", "function": {"name": name}}),
            None => tool_choice.clone(),
        },
        _ => tool_choice.clone(),
    }
}

/// Convert an OpenAI chat-completions request body into an Anthropic
/// `/v1/messages` body. The inverse of [`anthropic_to_openai`] for plain
/// text conversations: `system`/`developer` messages move to the
/// top-level `system` field, `stop` becomes `stop_sequences`, and
/// `max_completion_tokens` stands in for a missing `max_tokens`.
pub fn openai_to_anthropic(request: &Value) -> Result<Value> {
    let req = request
        .as_object()
        .ok_or(TranscodeError::NotAnObject("request"))?;

    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<Value> = Vec::new();

    let empty = Vec::new();
    for message in req
        .get("messages")
        .and_then(Value::as_array)
        .unwrap_or(&empty)
    {
        let role = message
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or("user");
        if role == "system" || role == "developer" {
            if let Some(text) = message.get("content").and_then(Value::as_str) {
                system_parts.push(text.to_string());
            }
            continue;
        }
        messages.push(json!({
            "role": role,
            "content": message.get("content").cloned().unwrap_or(Value::Null),
        }));
    }

    let mut out = Map::new();
    if let Some(model) = req.get("model") {
        out.insert("model".to_string(), model.clone());
    }
    out.insert("messages".to_string(), Value::Array(messages));
    if !system_parts.is_empty() {
        out.insert("system".to_string(), json!(system_parts.join("\n\n")));
    }

    if let Some(max_tokens) = req.get("max_tokens").or_else(|| req.get("max_completion_tokens")) {
        out.insert("max_tokens".to_string(), max_tokens.clone());
    }
    for field in ["temperature", "top_p", "stream"] {
        if let Some(value) = req.get(field) {
            out.insert(field.to_string(), value.clone());
        }
    }

    match req.get("stop") {
        Some(Value::String(stop)) => {
            out.insert("stop_sequences".to_string(), json!([stop]));
        }
        Some(Value::Array(stops)) => {
            out.insert("stop_sequences".to_string(), Value::Array(stops.clone()));
        }
        _ => {}
    }

    Ok(Value::Object(out))
}

/// Flatten Anthropic content (string or array of blocks) to a single string,
/// joining text blocks with newlines. Non-text blocks are skipped.
pub(crate) fn flatten_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            texts.join("\n")
        }
        _ => String::new(),
    }
}

fn has_block(content: &Value, block_type: &str) -> bool {
    content
        .as_array()
        .is_some_and(|blocks| {
            blocks
                .iter()
                .any(|block| block.get("type").and_then(Value::as_str) == Some(block_type))
        })
}

fn blocks_of<'a>(content: &'a Value, block_type: &'a str) -> impl Iterator<Item = &'a Value> {
    content
        .as_array()
        .map(|blocks| blocks.as_slice())
        .unwrap_or(&[])
        .iter()
        .filter(move |block| block.get("type").and_then(Value::as_str) == Some(block_type))
}

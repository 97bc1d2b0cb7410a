//! OpenAI → Anthropic streaming conversion
//!
//! The converter is a small state machine fed one OpenAI SSE chunk at a
//! time. Each chunk expands to zero or more Anthropic events, emitted in
//! the order the Anthropic client expects:
//! `message_start` → `content_block_start` → `content_block_delta`* →
//! `content_block_stop` → `message_delta` → `message_stop`.

use crate::Result;
use serde::Deserialize;
use serde_json::{json, Value};

/// One OpenAI chat-completions stream chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiStreamUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamChoice {
    #[serde(default)]
    pub delta: OpenAiStreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamUsage {
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub prompt_tokens: u64,
}

/// A converted Anthropic SSE event: the `event:` name plus the `data:`
/// payload.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub event: &'static str,
    pub data: Value,
}

impl StreamEvent {
    fn new(event: &'static str, data: Value) -> Self {
        Self { event, data }
    }
}

/// Per-stream conversion state.
#[derive(Debug)]
pub struct StreamConverter {
    model: String,
    message_started: bool,
    content_block_started: bool,
    finished: bool,
}

impl StreamConverter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            message_started: false,
            content_block_started: false,
            finished: false,
        }
    }

    /// Whether a `message_stop` has already been emitted.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Convert the JSON payload of one `data:` line. Returns the Anthropic
    /// events to forward, possibly none.
    pub fn convert(&mut self, payload: &str) -> Result<Vec<StreamEvent>> {
        let chunk: OpenAiStreamChunk = serde_json::from_str(payload)?;
        Ok(self.convert_chunk(&chunk))
    }

    /// Convert an already-parsed chunk.
    pub fn convert_chunk(&mut self, chunk: &OpenAiStreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        let Some(choice) = chunk.choices.first() else {
            return events;
        };

        let has_role = choice.delta.role.as_deref().is_some_and(|r| !r.is_empty());
        let text = choice.delta.content.as_deref().unwrap_or("");
        let finish_reason = choice.finish_reason.as_deref().filter(|r| !r.is_empty());

        // The first actionable chunk opens the message and its single text
        // block, whether or not the upstream bothered to send a role-only
        // preamble chunk.
        if !self.message_started && (has_role || !text.is_empty() || finish_reason.is_some()) {
            self.start_message(&chunk.id, &mut events);
        }

        if !text.is_empty() {
            events.push(StreamEvent::new(
                "content_block_delta",
                json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": {"type": "text_delta", "text": text},
                }),
            ));
        }

        if let Some(reason) = finish_reason {
            if !self.finished {
                self.finish_message(reason, &mut events);
            }
        }

        events
    }

    /// Handle the `[DONE]` sentinel: emit the terminating `message_stop` if
    /// the upstream never sent a finish reason.
    pub fn on_done(&mut self) -> Vec<StreamEvent> {
        if self.finished || !self.message_started {
            return Vec::new();
        }
        self.finished = true;
        vec![StreamEvent::new(
            "message_stop",
            json!({"type": "message_stop"}),
        )]
    }

    fn start_message(&mut self, id: &str, events: &mut Vec<StreamEvent>) {
        self.message_started = true;
        self.content_block_started = true;

        events.push(StreamEvent::new(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": id,
                    "type": "message",
                    "role": "assistant",
                    "model": self.model,
                    "content": [],
                    "usage": {"input_tokens": 0, "output_tokens": 0},
                },
            }),
        ));
        events.push(StreamEvent::new(
            "content_block_start",
            json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": {"type": "text", "text": ""},
            }),
        ));
    }

    fn finish_message(&mut self, reason: &str, events: &mut Vec<StreamEvent>) {
        self.finished = true;

        if self.content_block_started {
            self.content_block_started = false;
            events.push(StreamEvent::new(
                "content_block_stop",
                json!({"type": "content_block_stop", "index": 0}),
            ));
        }
        events.push(StreamEvent::new(
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": {"stop_reason": map_stream_stop_reason(reason), "stop_sequence": null},
                "usage": {"output_tokens": 0},
            }),
        ));
        events.push(StreamEvent::new(
            "message_stop",
            json!({"type": "message_stop"}),
        ));
    }
}

/// Streaming stop-reason mapping. Narrower than the non-streaming map:
/// anything that is not `stop` or `length` becomes `end_turn`.
fn map_stream_stop_reason(reason: &str) -> &'static str {
    match reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        _ => "end_turn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_types(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event).collect()
    }

    #[test]
    fn test_full_stream_sequence() {
        let mut converter = StreamConverter::new("m");
        let mut all = Vec::new();

        for payload in [
            r#"{"id":"c1","choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"id":"c1","choices":[{"delta":{"content":"he"}}]}"#,
            r#"{"id":"c1","choices":[{"delta":{"content":"llo"}}]}"#,
            r#"{"id":"c1","choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ] {
            all.extend(converter.convert(payload).unwrap());
        }

        assert_eq!(
            event_types(&all),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        assert_eq!(all[0].data["message"]["id"], "c1");
        assert_eq!(all[0].data["message"]["model"], "m");
        assert_eq!(all[2].data["delta"]["text"], "he");
        assert_eq!(all[3].data["delta"]["text"], "llo");
        assert_eq!(all[5].data["delta"]["stop_reason"], "end_turn");
        assert!(converter.finished());
    }

    #[test]
    fn test_stream_without_role_chunk_still_starts_message() {
        let mut converter = StreamConverter::new("m");
        let events = converter
            .convert(r#"{"id":"c1","choices":[{"delta":{"content":"hi"}}]}"#)
            .unwrap();
        assert_eq!(
            event_types(&events),
            vec!["message_start", "content_block_start", "content_block_delta"]
        );
    }

    #[test]
    fn test_length_finish_maps_to_max_tokens() {
        let mut converter = StreamConverter::new("m");
        converter
            .convert(r#"{"id":"c1","choices":[{"delta":{"role":"assistant"}}]}"#)
            .unwrap();
        let events = converter
            .convert(r#"{"id":"c1","choices":[{"delta":{},"finish_reason":"length"}]}"#)
            .unwrap();
        assert_eq!(events[1].data["delta"]["stop_reason"], "max_tokens");
    }

    #[test]
    fn test_unknown_finish_maps_to_end_turn() {
        let mut converter = StreamConverter::new("m");
        let events = converter
            .convert(r#"{"id":"c1","choices":[{"delta":{},"finish_reason":"content_filter"}]}"#)
            .unwrap();
        let message_delta = events.iter().find(|e| e.event == "message_delta").unwrap();
        assert_eq!(message_delta.data["delta"]["stop_reason"], "end_turn");
    }

    #[test]
    fn test_exactly_one_message_stop_with_finish_reason() {
        let mut converter = StreamConverter::new("m");
        let mut all = Vec::new();
        all.extend(
            converter
                .convert(r#"{"id":"c1","choices":[{"delta":{"content":"x"},"finish_reason":null}]}"#)
                .unwrap(),
        );
        all.extend(
            converter
                .convert(r#"{"id":"c1","choices":[{"delta":{},"finish_reason":"stop"}]}"#)
                .unwrap(),
        );
        // [DONE] after the finish chunk must not produce a second stop.
        all.extend(converter.on_done());

        let stops = all.iter().filter(|e| e.event == "message_stop").count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_done_without_finish_reason_emits_message_stop() {
        let mut converter = StreamConverter::new("m");
        converter
            .convert(r#"{"id":"c1","choices":[{"delta":{"content":"hi"}}]}"#)
            .unwrap();
        let events = converter.on_done();
        assert_eq!(event_types(&events), vec!["message_stop"]);
        assert!(converter.finished());
    }

    #[test]
    fn test_done_before_any_chunk_is_silent() {
        let mut converter = StreamConverter::new("m");
        assert!(converter.on_done().is_empty());
    }

    #[test]
    fn test_empty_choices_ignored() {
        let mut converter = StreamConverter::new("m");
        let events = converter.convert(r#"{"id":"c1","choices":[]}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_malformed_chunk_is_an_error() {
        let mut converter = StreamConverter::new("m");
        assert!(converter.convert("{not json").is_err());
    }
}

//! SSE framing helpers and best-effort token counting
//!
//! Both providers frame streaming responses as `data: <json>` lines with a
//! terminal `data: [DONE]` sentinel. Token counting over a stream is
//! approximate: when the upstream never reports usage, text deltas are
//! estimated at ⌈len/4⌉ tokens each, so TPS comparisons across providers
//! are approximate as well.

use serde_json::Value;

/// The terminal stream sentinel used by both providers.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Extract the payload of a `data:` SSE line, trimmed. Returns `None` for
/// comments, event lines and blank lines.
pub fn data_payload(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed.strip_prefix("data:").map(str::trim)
}

/// Estimate the token count of a text fragment at roughly four characters
/// per token, never less than 1 for non-empty text.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Running token count for one stream.
///
/// Text (and thinking) deltas accumulate estimates; a reported
/// `usage.output_tokens` from a `message_delta` supersedes the estimate.
/// The final tally is the greater of the two.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenTally {
    estimated: u64,
    reported: u64,
}

impl TokenTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one parsed Anthropic stream event.
    pub fn observe(&mut self, event: &Value) {
        match event.get("type").and_then(Value::as_str) {
            Some("content_block_delta") => {
                if let Some(delta) = event.get("delta") {
                    if let Some(text) = delta.get("text").and_then(Value::as_str) {
                        self.estimated += estimate_tokens(text);
                    }
                    if let Some(thinking) = delta.get("thinking").and_then(Value::as_str) {
                        self.estimated += estimate_tokens(thinking);
                    }
                }
            }
            Some("message_delta") => {
                if let Some(output_tokens) = event
                    .get("usage")
                    .and_then(|usage| usage.get("output_tokens"))
                    .and_then(Value::as_u64)
                {
                    self.reported = self.reported.max(output_tokens);
                }
            }
            _ => {}
        }
    }

    /// The greater of the estimate and any reported count.
    pub fn total(&self) -> u64 {
        self.estimated.max(self.reported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_payload() {
        assert_eq!(data_payload("data: {\"a\":1}\n"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data: [DONE]"), Some(DONE_SENTINEL));
        assert_eq!(data_payload("event: message_start"), None);
        assert_eq!(data_payload(""), None);
        assert_eq!(data_payload(": keep-alive comment"), None);
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("12345678"), 2);
    }

    #[test]
    fn test_tally_accumulates_deltas() {
        let mut tally = TokenTally::new();
        tally.observe(&json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "hello wor"},
        }));
        tally.observe(&json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "ld"},
        }));
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn test_reported_usage_supersedes_estimate() {
        let mut tally = TokenTally::new();
        tally.observe(&json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "hi"},
        }));
        tally.observe(&json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn"},
            "usage": {"output_tokens": 42},
        }));
        assert_eq!(tally.total(), 42);
    }

    #[test]
    fn test_estimate_wins_when_larger() {
        let mut tally = TokenTally::new();
        tally.observe(&json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "a".repeat(400)},
        }));
        tally.observe(&json!({
            "type": "message_delta",
            "delta": {},
            "usage": {"output_tokens": 5},
        }));
        assert_eq!(tally.total(), 100);
    }

    #[test]
    fn test_thinking_deltas_counted() {
        let mut tally = TokenTally::new();
        tally.observe(&json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "thinking_delta", "thinking": "pondering"},
        }));
        assert_eq!(tally.total(), 3);
    }
}

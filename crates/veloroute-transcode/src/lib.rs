//! Veloroute Format Transcoder
//!
//! Pure, stateless conversion between the Anthropic messages schema and the
//! OpenAI chat-completions schema:
//! - request bodies (Anthropic → OpenAI)
//! - non-streaming responses (OpenAI → Anthropic)
//! - streaming SSE chunks (OpenAI → Anthropic, one chunk at a time)
//!
//! Message content and tool arguments arrive as untyped JSON, so the
//! converters walk `serde_json::Value` trees and destructure the few block
//! shapes of interest (`text`, `tool_use`, `tool_result`) by key. Only the
//! OpenAI stream chunk, whose shape is small and fixed, gets typed structs.

use thiserror::Error;

pub mod request;
pub mod response;
pub mod sse;
pub mod stream;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} body is not a JSON object")]
    NotAnObject(&'static str),
}

pub type Result<T> = std::result::Result<T, TranscodeError>;

//! Upstream error classification and the client-facing error envelope

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Internal classification of a failed upstream attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure, TLS, DNS, timeout or cancellation
    Network,
    /// Upstream 401/403
    Auth,
    /// Upstream 429
    RateLimit,
    /// Any other upstream 4xx
    Client,
    /// Upstream 5xx
    Server,
    /// Response body could not be converted between wire formats
    Transcode,
}

impl ErrorKind {
    fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Auth,
            429 => ErrorKind::RateLimit,
            400..=499 => ErrorKind::Client,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Network,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network_error",
            ErrorKind::Auth => "authentication_error",
            ErrorKind::RateLimit => "rate_limit_error",
            ErrorKind::Client => "client_error",
            ErrorKind::Server => "server_error",
            ErrorKind::Transcode => "transcode_error",
        };
        f.write_str(name)
    }
}

/// One failed attempt against one provider. The dispatcher collects these
/// while walking the candidate list and embeds the most recent one in the
/// final 502.
#[derive(Debug, Clone)]
pub struct UpstreamFailure {
    pub kind: ErrorKind,
    /// Upstream HTTP status; 0 for network and transcode failures.
    pub status: u16,
    pub provider: String,
    pub message: String,
}

impl UpstreamFailure {
    pub fn network(provider: &str, message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Network,
            status: 0,
            provider: provider.to_string(),
            message: format!("network error: {}", message),
        }
    }

    pub fn from_status(provider: &str, status: u16) -> Self {
        let kind = ErrorKind::from_status(status);
        let message = match kind {
            ErrorKind::Auth => "authentication or authorization failed".to_string(),
            ErrorKind::RateLimit => "rate limit exceeded".to_string(),
            _ => format!("upstream returned status {}", status),
        };
        Self {
            kind,
            status,
            provider: provider.to_string(),
            message,
        }
    }

    pub fn transcode(provider: &str, message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Transcode,
            status: 0,
            provider: provider.to_string(),
            message: format!("response conversion failed: {}", message),
        }
    }
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} (status: {})",
            self.provider, self.kind, self.message, self.status
        )
    }
}

/// Build a client-facing error response in Anthropic's envelope:
/// `{"error":{"type":...,"message":...}}`.
pub fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"type": error_type, "message": message}})),
    )
        .into_response()
}

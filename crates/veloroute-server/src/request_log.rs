//! Per-attempt request/response hooks
//!
//! The dispatcher invokes these callbacks around every upstream attempt.
//! Header values for credentials are truncated before they reach any
//! implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Observer of upstream attempts. The default implementation logs via
/// `tracing`; deployments can plug in a persistent logger instead.
#[async_trait]
pub trait RequestLog: Send + Sync {
    async fn on_request(
        &self,
        provider: &str,
        model: &str,
        path: &str,
        headers: &HashMap<String, String>,
        body_len: usize,
        attempt: usize,
        streaming: bool,
    );

    #[allow(clippy::too_many_arguments)]
    async fn on_response(
        &self,
        provider: &str,
        model: &str,
        status: u16,
        duration: Duration,
        tokens: u64,
        attempt: usize,
        success: bool,
        error: Option<&str>,
        streaming: bool,
    );
}

/// Default observer: structured debug logs.
#[derive(Debug, Default)]
pub struct TracingRequestLog;

#[async_trait]
impl RequestLog for TracingRequestLog {
    async fn on_request(
        &self,
        provider: &str,
        model: &str,
        path: &str,
        headers: &HashMap<String, String>,
        body_len: usize,
        attempt: usize,
        streaming: bool,
    ) {
        let sanitized = sanitize_headers(headers);
        debug!(
            provider,
            model,
            path,
            body_len,
            attempt,
            streaming,
            headers = ?sanitized,
            "upstream request"
        );
    }

    async fn on_response(
        &self,
        provider: &str,
        model: &str,
        status: u16,
        duration: Duration,
        tokens: u64,
        attempt: usize,
        success: bool,
        error: Option<&str>,
        streaming: bool,
    ) {
        debug!(
            provider,
            model,
            status,
            duration_ms = duration.as_millis() as u64,
            tokens,
            attempt,
            success,
            error,
            streaming,
            "upstream response"
        );
    }
}

/// Copy headers with credential values truncated to a short prefix.
pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.to_lowercase();
            if lower == "authorization" || lower == "x-api-key" {
                (name.clone(), truncate_secret(value))
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

fn truncate_secret(value: &str) -> String {
    const VISIBLE: usize = 12;
    if value.chars().count() <= VISIBLE {
        return value.to_string();
    }
    let prefix: String = value.chars().take(VISIBLE).collect();
    format!("{}...", prefix)
}

//! Failover dispatcher for `POST /v1/messages`
//!
//! Walks the selector's candidate list in order, trying each provider
//! until one succeeds. Failing over to the next candidate is immediate;
//! only retries against the same provider (when enabled) ever sleep.

use crate::app::AppState;
use crate::error::{error_response, UpstreamFailure};
use crate::stream;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, warn};
use veloroute_core::{RetryConfig, WireFormat};
use veloroute_egress::EgressError;
use veloroute_routing::Candidate;
use veloroute_transcode::response::openai_to_anthropic;

pub async fn handle_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "invalid JSON in request body",
            )
        }
    };

    let Some(requested_model) = request
        .get("model")
        .and_then(Value::as_str)
        .filter(|model| !model.is_empty())
        .map(str::to_string)
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "model field is required",
        );
    };

    let is_streaming = request
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let thinking_requested =
        request.pointer("/thinking/type").and_then(Value::as_str) == Some("enabled");

    let candidates = match state.selector.select(&requested_model, thinking_requested) {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(model = %requested_model, error = %e, "no route for model");
            return error_response(StatusCode::BAD_GATEWAY, "no_providers", &e.to_string());
        }
    };

    let forward_headers = forwardable_headers(&headers);
    let retry = state.retry_config();

    let mut last_failure: Option<UpstreamFailure> = None;
    for (attempt, candidate) in candidates.iter().enumerate() {
        request["model"] = Value::String(candidate.upstream_model.clone());
        let upstream_body = match serde_json::to_vec(&request) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };

        debug!(
            provider = %candidate.provider.name,
            model = %requested_model,
            upstream_model = %candidate.upstream_model,
            weight = candidate.weight,
            tps = candidate.tps,
            streaming = is_streaming,
            "trying provider"
        );

        let outcome = if is_streaming {
            stream::try_streaming(
                &state,
                candidate,
                &requested_model,
                &upstream_body,
                &forward_headers,
                &retry,
                attempt,
            )
            .await
        } else {
            try_non_streaming(
                &state,
                candidate,
                &requested_model,
                &upstream_body,
                &forward_headers,
                &retry,
                attempt,
            )
            .await
        };

        match outcome {
            Ok(response) => return response,
            Err(failure) => {
                warn!(provider = %candidate.provider.name, failure = %failure, "provider attempt failed");
                last_failure = Some(failure);
            }
        }
    }

    error!(model = %requested_model, "all providers failed");
    match last_failure {
        Some(failure) => error_response(
            StatusCode::BAD_GATEWAY,
            "all_providers_failed",
            &format!("All providers failed: {}", failure.message),
        ),
        None => error_response(
            StatusCode::BAD_GATEWAY,
            "all_providers_failed",
            "All providers failed to process the request",
        ),
    }
}

/// One non-streaming attempt against one candidate. Success means the
/// client already has its response; any `Err` advances the candidate loop.
async fn try_non_streaming(
    state: &AppState,
    candidate: &Candidate,
    requested_model: &str,
    body: &[u8],
    headers: &HashMap<String, String>,
    retry: &RetryConfig,
    attempt: usize,
) -> Result<Response, UpstreamFailure> {
    let provider = candidate.provider.name.as_str();
    let model = candidate.upstream_model.as_str();

    state
        .request_log
        .on_request(
            provider,
            model,
            veloroute_egress::MESSAGES_PATH,
            headers,
            body.len(),
            attempt,
            false,
        )
        .await;

    let started = Instant::now();
    let response = match send_upstream(candidate, veloroute_egress::MESSAGES_PATH, body, headers, retry)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let failure = classify_egress_error(provider, e);
            state.errors.record_error(provider, model, 0);
            log_failure(state, candidate, started, attempt, false, &failure).await;
            return Err(failure);
        }
    };

    let status = response.status();
    if !status.is_success() {
        let failure = UpstreamFailure::from_status(provider, status.as_u16());
        state.errors.record_error(provider, model, status.as_u16());
        log_failure(state, candidate, started, attempt, false, &failure).await;
        return Err(failure);
    }

    let upstream_content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    let raw = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            let failure = UpstreamFailure::network(provider, &e);
            state.errors.record_error(provider, model, 0);
            log_failure(state, candidate, started, attempt, false, &failure).await;
            return Err(failure);
        }
    };
    let duration = started.elapsed();

    // OpenAI responses are rewritten into the Anthropic schema before
    // anything reaches the client; a conversion failure counts against
    // the candidate like any other upstream failure.
    let payload = match candidate.provider.wire_format {
        WireFormat::OpenAI => match convert_response(&raw, requested_model) {
            Ok(converted) => converted,
            Err(message) => {
                let failure = UpstreamFailure::transcode(provider, &message);
                state.errors.record_error(provider, model, 0);
                log_failure(state, candidate, started, attempt, false, &failure).await;
                return Err(failure);
            }
        },
        WireFormat::Anthropic => raw,
    };

    let tokens = output_tokens(&payload);
    state.tps.record(provider, model, tokens, duration);
    state.errors.record_success(provider, model);
    state
        .request_log
        .on_response(
            provider,
            model,
            status.as_u16(),
            duration,
            tokens,
            attempt,
            true,
            None,
            false,
        )
        .await;

    debug!(
        provider,
        model,
        tokens,
        duration_secs = duration.as_secs_f64(),
        "request succeeded"
    );

    Response::builder()
        .status(status.as_u16())
        .header(header::CONTENT_TYPE, upstream_content_type)
        .body(Body::from(payload))
        .map_err(|e| UpstreamFailure::network(provider, &e))
}

/// Sort an egress error into the spec's kinds: a request-side conversion
/// failure is a transcode error, everything else a network failure.
pub(crate) fn classify_egress_error(provider: &str, error: EgressError) -> UpstreamFailure {
    match error {
        EgressError::Transcode(e) => UpstreamFailure::transcode(provider, &e),
        other => UpstreamFailure::network(provider, &other),
    }
}

/// Issue the upstream call, inside the backoff loop when enabled.
pub(crate) async fn send_upstream(
    candidate: &Candidate,
    path: &str,
    body: &[u8],
    headers: &HashMap<String, String>,
    retry: &RetryConfig,
) -> veloroute_egress::Result<reqwest::Response> {
    if retry.enabled {
        candidate
            .provider
            .client
            .proxy_request_with_retry(path, body, headers, retry)
            .await
    } else {
        candidate.provider.client.proxy_request(path, body, headers).await
    }
}

pub(crate) async fn log_failure(
    state: &AppState,
    candidate: &Candidate,
    started: Instant,
    attempt: usize,
    streaming: bool,
    failure: &UpstreamFailure,
) {
    state
        .request_log
        .on_response(
            &candidate.provider.name,
            &candidate.upstream_model,
            failure.status,
            started.elapsed(),
            0,
            attempt,
            false,
            Some(&failure.message),
            streaming,
        )
        .await;
}

fn convert_response(raw: &[u8], requested_model: &str) -> Result<Bytes, String> {
    let upstream: Value = serde_json::from_slice(raw).map_err(|e| e.to_string())?;
    let converted = openai_to_anthropic(&upstream, requested_model).map_err(|e| e.to_string())?;
    serde_json::to_vec(&converted)
        .map(Bytes::from)
        .map_err(|e| e.to_string())
}

/// Headers copied from the client request toward upstream. The client's
/// own credentials never travel upstream.
pub(crate) fn forwardable_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str().to_lowercase() != "authorization")
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

/// `usage.output_tokens` (Anthropic) or `usage.completion_tokens`
/// (OpenAI), 0 when the body has neither.
pub(crate) fn output_tokens(body: &[u8]) -> u64 {
    let Ok(parsed) = serde_json::from_slice::<Value>(body) else {
        return 0;
    };
    let usage = parsed.get("usage");
    usage
        .and_then(|usage| usage.get("output_tokens"))
        .or_else(|| usage.and_then(|usage| usage.get("completion_tokens")))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

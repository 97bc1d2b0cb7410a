//! Model listing, health and token-counting handlers

use crate::app::AppState;
use crate::dispatch::forwardable_headers;
use crate::error::{error_response, UpstreamFailure};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

/// GET /v1/models: enumerate the model registry.
pub async fn handle_list_models(State(state): State<AppState>) -> Response {
    let data: Vec<Value> = state
        .models
        .all()
        .iter()
        .map(|model| {
            let mut entry = json!({
                "id": model.name,
                "object": "model",
                "created": 0,
                "owned_by": model.provider,
                "weight": model.effective_weight(),
            });
            if !model.alias.is_empty() {
                entry["alias"] = json!(model.alias);
            }
            if model.context > 0 {
                entry["context_window"] = json!(model.context);
            }
            entry
        })
        .collect();

    Json(json!({"object": "list", "data": data})).into_response()
}

/// GET /health: per-provider health derived from error rates. 503 when
/// no provider is healthy.
pub async fn handle_health(State(state): State<AppState>) -> Response {
    let providers = state.providers.all();

    let mut healthy_count = 0;
    let mut provider_status = serde_json::Map::new();
    for provider in &providers {
        let error_rate = state.errors.error_rate(&provider.name);
        let healthy = state.errors.is_healthy(&provider.name);
        if healthy {
            healthy_count += 1;
        }
        provider_status.insert(
            provider.name.clone(),
            json!({"healthy": healthy, "error_rate": error_rate}),
        );
    }

    let overall_healthy = healthy_count > 0;
    let status = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if overall_healthy { "healthy" } else { "unhealthy" },
        "healthy_providers": healthy_count,
        "total_providers": providers.len(),
        "providers": provider_status,
        "tps_threshold": state.selector.threshold(),
    });

    (status, Json(body)).into_response()
}

/// POST /v1/messages/count_tokens: same routing as `/v1/messages`, but
/// the body is proxied without any wire-format rewrite. OpenAI upstreams
/// have no equivalent endpoint, so candidates routed there fail and the
/// loop advances; with only OpenAI candidates the request ends in a 502.
pub async fn handle_count_tokens(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    const COUNT_TOKENS_PATH: &str = "/v1/messages/count_tokens";

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

    let thinking_requested =
        request.pointer("/thinking/type").and_then(Value::as_str) == Some("enabled");

    let candidates = match state.selector.select(&requested_model, thinking_requested) {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(model = %requested_model, error = %e, "no route for token counting");
            return error_response(StatusCode::BAD_GATEWAY, "no_providers", &e.to_string());
        }
    };

    let forward_headers = forwardable_headers(&headers);

    let mut last_failure: Option<UpstreamFailure> = None;
    for candidate in &candidates {
        request["model"] = Value::String(candidate.upstream_model.clone());
        let upstream_body = match serde_json::to_vec(&request) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };

        debug!(
            provider = %candidate.provider.name,
            model = %candidate.upstream_model,
            alias = %requested_model,
            "trying provider for token counting"
        );

        let response = match candidate
            .provider
            .client
            .proxy_request(COUNT_TOKENS_PATH, &upstream_body, &forward_headers)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let failure = UpstreamFailure::network(&candidate.provider.name, &e);
                warn!(failure = %failure, "token counting attempt failed");
                last_failure = Some(failure);
                continue;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let failure = UpstreamFailure::from_status(&candidate.provider.name, status.as_u16());
            warn!(failure = %failure, "token counting attempt failed");
            last_failure = Some(failure);
            continue;
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/json")
            .to_string();

        match response.bytes().await {
            Ok(bytes) => {
                return Response::builder()
                    .status(status.as_u16())
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(bytes))
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }
            Err(e) => {
                last_failure = Some(UpstreamFailure::network(&candidate.provider.name, &e));
            }
        }
    }

    error!(model = %requested_model, "all providers failed for token counting");
    match last_failure {
        Some(failure) => error_response(
            StatusCode::BAD_GATEWAY,
            "all_providers_failed",
            &format!("All providers failed: {}", failure.message),
        ),
        None => error_response(
            StatusCode::BAD_GATEWAY,
            "all_providers_failed",
            "All providers failed to process the token counting request",
        ),
    }
}

//! End-to-end gateway tests with wiremock upstreams
//!
//! These drive the full axum app: request parsing, candidate selection,
//! failover, wire-format conversion, streaming, metrics and the error
//! envelope.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use tower::ServiceExt;
use veloroute_core::{
    BenchmarkConfig, GatewayConfig, ListenConfig, ModelConfig, ProviderConfig, RetryConfig,
    WireFormat,
};
use veloroute_server::{build_router, AppState, Benchmarker};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(endpoint: &str, wire_format: WireFormat) -> ProviderConfig {
    ProviderConfig {
        endpoint: endpoint.to_string(),
        api_key: "upstream-key".to_string(),
        wire_format,
    }
}

fn model(name: &str, provider: &str, weight: i64) -> ModelConfig {
    ModelConfig {
        name: name.to_string(),
        alias: String::new(),
        provider: provider.to_string(),
        context: 0,
        weight,
        supports_thinking: false,
    }
}

fn gateway(
    providers: Vec<(&str, ProviderConfig)>,
    models: Vec<ModelConfig>,
    api_keys: Vec<String>,
) -> (Router, AppState) {
    let config = GatewayConfig {
        server: ListenConfig::default(),
        providers: providers
            .into_iter()
            .map(|(name, config)| (name.to_string(), config))
            .collect::<HashMap<_, _>>(),
        models,
        api_keys,
        retry: RetryConfig::default(),
        tps_threshold: 40.0,
        benchmark: BenchmarkConfig::default(),
    };
    let state = AppState::from_config(&config);
    (build_router(state.clone()), state)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn messages_body(model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "hi"}],
        "max_tokens": 10,
        "stream": false,
    })
}

#[tokio::test]
async fn test_invalid_json_is_rejected() {
    let (app, _) = gateway(vec![], vec![model("m", "p", 1)], vec![]);
    // An empty provider set never gets that far: the body fails first.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["type"], "invalid_request");
}

#[tokio::test]
async fn test_missing_model_is_rejected() {
    let (app, _) = gateway(vec![], vec![model("m", "p", 1)], vec![]);
    let (status, body) = post_json(&app, "/v1/messages", json!({"messages": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");
    assert_eq!(body["error"]["message"], "model field is required");
}

#[tokio::test]
async fn test_unknown_model_yields_no_providers() {
    let server = MockServer::start().await;
    let (app, _) = gateway(
        vec![("p", provider(&server.uri(), WireFormat::Anthropic))],
        vec![model("m", "p", 1)],
        vec![],
    );

    let (status, body) = post_json(&app, "/v1/messages", messages_body("unknown")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["type"], "no_providers");
}

#[tokio::test]
async fn test_failover_on_server_error() {
    let p1 = MockServer::start().await;
    let p2 = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&p1)
        .await;

    let p2_body = json!({
        "id": "msg_2",
        "type": "message",
        "role": "assistant",
        "model": "X",
        "content": [{"type": "text", "text": "ok"}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 3, "output_tokens": 7},
    });
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(p2_body.clone()))
        .expect(1)
        .mount(&p2)
        .await;

    // p1 carries more weight, so it is tried (and fails) first.
    let (app, state) = gateway(
        vec![
            ("p1", provider(&p1.uri(), WireFormat::Anthropic)),
            ("p2", provider(&p2.uri(), WireFormat::Anthropic)),
        ],
        vec![model("X", "p1", 5), model("X", "p2", 1)],
        vec![],
    );

    let (status, body) = post_json(&app, "/v1/messages", messages_body("X")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, p2_body);

    let p1_stats = state.errors.provider_stats("p1").unwrap();
    assert_eq!(p1_stats.errors, 1);
    assert_eq!(p1_stats.last_error_status, 500);
    let p2_stats = state.errors.provider_stats("p2").unwrap();
    assert_eq!(p2_stats.successes, 1);

    // One metric sample with the response's output tokens.
    let metrics = state.tps.snapshot();
    let entry = metrics
        .iter()
        .find(|m| m.provider == "p2" && m.model == "X")
        .unwrap();
    assert_eq!(entry.samples.len(), 1);
    assert_eq!(entry.samples[0].tokens, 7);
    assert!(state.tps.tps("p2", "X") > 0.0);
}

#[tokio::test]
async fn test_all_providers_failed_envelope() {
    let p1 = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&p1)
        .await;

    let (app, _) = gateway(
        vec![("p1", provider(&p1.uri(), WireFormat::Anthropic))],
        vec![model("X", "p1", 1)],
        vec![],
    );

    let (status, body) = post_json(&app, "/v1/messages", messages_body("X")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["type"], "all_providers_failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("All providers failed"));
}

#[tokio::test]
async fn test_openai_request_and_response_transcoding() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "c1",
            "choices": [{
                "message": {"content": "hello"},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (app, state) = gateway(
        vec![("openai", provider(&server.uri(), WireFormat::OpenAI))],
        vec![model("m", "openai", 1)],
        vec![],
    );

    let (status, body) = post_json(&app, "/v1/messages", messages_body("m")).await;
    assert_eq!(status, StatusCode::OK);

    // The client sees an Anthropic-shaped response naming its own model.
    assert_eq!(body["id"], "c1");
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["model"], "m");
    assert_eq!(body["content"], json!([{"type": "text", "text": "hello"}]));
    assert_eq!(body["stop_reason"], "end_turn");
    assert_eq!(body["usage"]["input_tokens"], 1);
    assert_eq!(body["usage"]["output_tokens"], 1);

    // The upstream saw an OpenAI request with bearer auth.
    let requests = server.received_requests().await.unwrap();
    let upstream: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        upstream["messages"],
        json!([{"role": "user", "content": "hi"}])
    );
    assert_eq!(
        requests[0]
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap(),
        "Bearer upstream-key"
    );

    // Metrics recorded from completion_tokens.
    assert!(state.tps.tps("openai", "m") > 0.0);
    assert_eq!(state.errors.provider_stats("openai").unwrap().successes, 1);
}

fn openai_sse_body() -> String {
    [
        r#"data: {"id":"c1","choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"data: {"id":"c1","choices":[{"delta":{"content":"he"}}]}"#,
        r#"data: {"id":"c1","choices":[{"delta":{"content":"llo"}}]}"#,
        r#"data: {"id":"c1","choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        "data: [DONE]",
        "",
    ]
    .join("\n\n")
}

/// Parse `event:`/`data:` framed SSE into (event, data-json) pairs.
fn parse_events(body: &str) -> Vec<(String, Value)> {
    let mut events = Vec::new();
    let mut current_event = String::new();
    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event: ") {
            current_event = name.to_string();
        } else if let Some(data) = line.strip_prefix("data: ") {
            if data == "[DONE]" {
                continue;
            }
            if let Ok(value) = serde_json::from_str(data) {
                events.push((current_event.clone(), value));
            }
        }
    }
    events
}

#[tokio::test]
async fn test_openai_stream_is_converted_to_anthropic_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(openai_sse_body(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (app, state) = gateway(
        vec![("openai", provider(&server.uri(), WireFormat::OpenAI))],
        vec![model("m", "openai", 1)],
        vec![],
    );

    let mut request = messages_body("m");
    request["stream"] = json!(true);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from(request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8_lossy(&bytes);

    let events = parse_events(&body);
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
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

    assert_eq!(events[0].1["message"]["model"], "m");
    assert_eq!(events[2].1["delta"]["text"], "he");
    assert_eq!(events[3].1["delta"]["text"], "llo");
    assert_eq!(events[5].1["delta"]["stop_reason"], "end_turn");
    // The sentinel is forwarded after message_stop.
    assert!(body.contains("data: [DONE]"));

    // The pump recorded a sample ("hello" estimates to 2 tokens).
    let metrics = state.tps.snapshot();
    let entry = metrics
        .iter()
        .find(|m| m.provider == "openai" && m.model == "m")
        .unwrap();
    assert_eq!(entry.samples[0].tokens, 2);
    assert_eq!(state.errors.provider_stats("openai").unwrap().successes, 1);
}

#[tokio::test]
async fn test_anthropic_stream_passes_through_verbatim() {
    let sse = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":3,\"output_tokens\":0}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hello\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":9}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let (app, state) = gateway(
        vec![("anthropic", provider(&server.uri(), WireFormat::Anthropic))],
        vec![model("claude-sonnet-4", "anthropic", 1)],
        vec![],
    );

    let mut request = messages_body("claude-sonnet-4");
    request["stream"] = json!(true);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from(request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    // Byte-for-byte forwarding.
    assert_eq!(String::from_utf8_lossy(&bytes), sse);

    // Reported usage (9) beats the estimate (2).
    let metrics = state.tps.snapshot();
    let entry = metrics
        .iter()
        .find(|m| m.provider == "anthropic")
        .unwrap();
    assert_eq!(entry.samples[0].tokens, 9);
}

#[tokio::test]
async fn test_streaming_failover_before_headers() {
    let p1 = MockServer::start().await;
    let p2 = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&p1)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"type\":\"message_stop\"}\n\n",
            "text/event-stream",
        ))
        .expect(1)
        .mount(&p2)
        .await;

    let (app, state) = gateway(
        vec![
            ("p1", provider(&p1.uri(), WireFormat::Anthropic)),
            ("p2", provider(&p2.uri(), WireFormat::Anthropic)),
        ],
        vec![model("X", "p1", 5), model("X", "p2", 1)],
        vec![],
    );

    let mut request = messages_body("X");
    request["stream"] = json!(true);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from(request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    response.into_body().collect().await.unwrap();
    assert_eq!(state.errors.provider_stats("p1").unwrap().last_error_status, 429);
    assert_eq!(state.errors.provider_stats("p2").unwrap().successes, 1);
}

#[tokio::test]
async fn test_models_endpoint() {
    let server = MockServer::start().await;
    let mut aliased = model("llama-3.3-70b", "groq", 3);
    aliased.alias = "claude-*".to_string();
    aliased.context = 131_072;

    let (app, _) = gateway(
        vec![("groq", provider(&server.uri(), WireFormat::OpenAI))],
        vec![model("claude-sonnet-4", "anthropic", 1), aliased],
        vec![],
    );

    let (status, body) = get(&app, "/v1/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "list");

    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["id"], "claude-sonnet-4");
    assert_eq!(data[0]["object"], "model");
    assert_eq!(data[0]["owned_by"], "anthropic");
    assert_eq!(data[0]["weight"], 1);
    assert!(data[0].get("alias").is_none());

    assert_eq!(data[1]["alias"], "claude-*");
    assert_eq!(data[1]["context_window"], 131_072);
    assert_eq!(data[1]["weight"], 3);
}

#[tokio::test]
async fn test_health_reports_provider_status() {
    let server = MockServer::start().await;
    let (app, state) = gateway(
        vec![("p1", provider(&server.uri(), WireFormat::Anthropic))],
        vec![model("m", "p1", 1)],
        vec![],
    );

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["healthy_providers"], 1);
    assert_eq!(body["total_providers"], 1);
    assert_eq!(body["tps_threshold"], 40.0);
    assert_eq!(body["providers"]["p1"]["healthy"], true);

    // Drive the error rate to 100%: the gateway goes unhealthy.
    state.errors.record_error("p1", "m", 500);
    state.errors.record_error("p1", "m", 500);

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["providers"]["p1"]["healthy"], false);
    assert_eq!(body["providers"]["p1"]["error_rate"], 1.0);
}

#[tokio::test]
async fn test_api_key_auth() {
    let server = MockServer::start().await;
    let (app, _) = gateway(
        vec![("p1", provider(&server.uri(), WireFormat::Anthropic))],
        vec![model("m", "p1", 1)],
        vec!["client-key".to_string()],
    );

    // No key → 401 with the Anthropic envelope.
    let (status, body) = get(&app, "/v1/models").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "authentication_error");

    // Bearer form.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/models")
                .header("authorization", "Bearer client-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // x-api-key form.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/models")
                .header("x-api-key", "client-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Wrong key.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/models")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Health stays open.
    let (status, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_count_tokens_proxies_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages/count_tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"input_tokens": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let (app, _) = gateway(
        vec![("anthropic", provider(&server.uri(), WireFormat::Anthropic))],
        vec![model("claude-sonnet-4", "anthropic", 1)],
        vec![],
    );

    let (status, body) = post_json(
        &app,
        "/v1/messages/count_tokens",
        json!({"model": "claude-sonnet-4", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["input_tokens"], 42);

    // No wire-format rewrite happened.
    let requests = server.received_requests().await.unwrap();
    let upstream: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(upstream["model"], "claude-sonnet-4");
    assert!(upstream.get("messages").unwrap().is_array());
}

#[tokio::test]
async fn test_count_tokens_fails_for_openai_upstream() {
    let server = MockServer::start().await;
    // OpenAI endpoints have no count_tokens; the upstream 404s.
    Mock::given(method("POST"))
        .and(path("/v1/messages/count_tokens"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (app, _) = gateway(
        vec![("openai", provider(&server.uri(), WireFormat::OpenAI))],
        vec![model("m", "openai", 1)],
        vec![],
    );

    let (status, body) = post_json(
        &app,
        "/v1/messages/count_tokens",
        json!({"model": "m", "messages": []}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["type"], "all_providers_failed");
}

#[tokio::test]
async fn test_benchmarker_skips_pairs_with_recent_traffic() {
    let server = MockServer::start().await;
    // The probe must never reach the upstream.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_, state) = gateway(
        vec![("p", provider(&server.uri(), WireFormat::Anthropic))],
        vec![model("m", "p", 1)],
        vec![],
    );

    // Fresh organic sample, well inside the 60 s window.
    state
        .tps
        .record("p", "m", 50, std::time::Duration::from_secs(1));

    let benchmarker = Benchmarker::new(
        &BenchmarkConfig::default(),
        state.providers.clone(),
        state.models.clone(),
        state.tps.clone(),
    );
    benchmarker.run_once().await;

    let history = benchmarker.history();
    let results = history.all();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].error_message, "Skipped - recent request exists");
}

#[tokio::test]
async fn test_benchmarker_probes_and_records_tps() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hello\"}}\n\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":6}}\n\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let (_, state) = gateway(
        vec![("p", provider(&server.uri(), WireFormat::Anthropic))],
        vec![model("m", "p", 1)],
        vec![],
    );

    let benchmarker = Benchmarker::new(
        &BenchmarkConfig::default(),
        state.providers.clone(),
        state.models.clone(),
        state.tps.clone(),
    );
    benchmarker.run_once().await;

    let results = benchmarker.history().all();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].tokens, 6);
    assert!(state.tps.tps("p", "m") > 0.0);

    let status = benchmarker.status();
    assert!(!status.is_running);
    assert_eq!(status.success_count, 1);
    assert_eq!(status.failure_count, 0);
    assert!(status.last_run_at.is_some());
}

#[tokio::test]
async fn test_benchmarker_records_provider_not_found() {
    let (_, state) = gateway(vec![], vec![model("m", "ghost", 1)], vec![]);

    let benchmarker = Benchmarker::new(
        &BenchmarkConfig::default(),
        state.providers.clone(),
        state.models.clone(),
        state.tps.clone(),
    );
    benchmarker.run_once().await;

    let results = benchmarker.history().all();
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(results[0].error_message, "Provider not found");
}

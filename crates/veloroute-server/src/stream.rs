//! Streaming path of the dispatcher
//!
//! Once an upstream answers 2xx, its SSE body is pumped to the client
//! line by line through a channel-backed response body. Anthropic
//! upstreams are forwarded byte-for-byte; OpenAI upstreams go through the
//! per-chunk converter and are re-framed as `event:`/`data:` pairs. Every
//! event is flushed to the client as its own body chunk, in upstream
//! arrival order.
//!
//! Token counting and metric recording happen in the pump task when the
//! upstream stream ends. If the client disconnects, the channel closes,
//! the pump stops, and the upstream response is dropped, aborting the
//! transfer.

use crate::app::AppState;
use crate::dispatch::{log_failure, send_upstream};
use crate::error::UpstreamFailure;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Instant;
use tracing::{debug, warn};
use veloroute_core::{RetryConfig, WireFormat};
use veloroute_routing::Candidate;
use veloroute_transcode::sse::{data_payload, TokenTally, DONE_SENTINEL};
use veloroute_transcode::stream::StreamConverter;

/// Tokens credited to a stream whose size could not be determined at all.
const UNKNOWN_STREAM_TOKENS: u64 = 100;

/// One streaming attempt against one candidate. Returns the SSE response
/// once the upstream has answered 2xx; failures before that advance the
/// candidate loop. After headers are sent there is no failover: a broken
/// stream simply ends without a final `message_stop`.
pub(crate) async fn try_streaming(
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
            true,
        )
        .await;

    let started = Instant::now();
    let upstream = match send_upstream(candidate, veloroute_egress::MESSAGES_PATH, body, headers, retry)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let failure = crate::dispatch::classify_egress_error(provider, e);
            state.errors.record_error(provider, model, 0);
            log_failure(state, candidate, started, attempt, true, &failure).await;
            return Err(failure);
        }
    };

    let status = upstream.status();
    if !status.is_success() {
        let failure = UpstreamFailure::from_status(provider, status.as_u16());
        state.errors.record_error(provider, model, status.as_u16());
        log_failure(state, candidate, started, attempt, true, &failure).await;
        return Err(failure);
    }

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(32);
    let pump = Pump {
        state: state.clone(),
        provider: provider.to_string(),
        model: model.to_string(),
        requested_model: requested_model.to_string(),
        wire_format: candidate.provider.wire_format,
        status: status.as_u16(),
        attempt,
        started,
    };
    tokio::spawn(pump.run(upstream, tx));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(rx))
        .map_err(|e| UpstreamFailure::network(provider, &e))
}

struct Pump {
    state: AppState,
    provider: String,
    model: String,
    requested_model: String,
    wire_format: WireFormat,
    status: u16,
    attempt: usize,
    started: Instant,
}

impl Pump {
    async fn run(
        self,
        upstream: reqwest::Response,
        mut tx: mpsc::Sender<Result<Bytes, Infallible>>,
    ) {
        let mut tally = TokenTally::new();
        let mut converter = StreamConverter::new(&self.requested_model);
        let mut byte_stream = upstream.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut client_gone = false;

        'receive: while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(provider = %self.provider, error = %e, "upstream stream ended with error");
                    break;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                if self
                    .forward_line(&line, &mut converter, &mut tally, &mut tx)
                    .await
                    .is_err()
                {
                    client_gone = true;
                    break 'receive;
                }
            }
        }

        // Flush a trailing line without a newline terminator.
        if !client_gone && !buffer.is_empty() {
            let line = std::mem::take(&mut buffer);
            let _ = self
                .forward_line(&line, &mut converter, &mut tally, &mut tx)
                .await;
        }

        let duration = self.started.elapsed();
        let mut tokens = tally.total();
        if tokens == 0 {
            tokens = UNKNOWN_STREAM_TOKENS;
        }

        self.state
            .tps
            .record(&self.provider, &self.model, tokens, duration);
        self.state.errors.record_success(&self.provider, &self.model);
        self.state
            .request_log
            .on_response(
                &self.provider,
                &self.model,
                self.status,
                duration,
                tokens,
                self.attempt,
                true,
                None,
                true,
            )
            .await;

        debug!(
            provider = %self.provider,
            model = %self.model,
            tokens,
            duration_secs = duration.as_secs_f64(),
            client_gone,
            "stream completed"
        );
    }

    /// Handle one upstream SSE line. An `Err` means the client hung up.
    async fn forward_line(
        &self,
        line: &[u8],
        converter: &mut StreamConverter,
        tally: &mut TokenTally,
        tx: &mut mpsc::Sender<Result<Bytes, Infallible>>,
    ) -> Result<(), ()> {
        match self.wire_format {
            WireFormat::Anthropic => {
                // Raw pass-through; parse data lines only to count tokens.
                let text = String::from_utf8_lossy(line);
                if let Some(payload) = data_payload(&text) {
                    if payload != DONE_SENTINEL {
                        if let Ok(event) = serde_json::from_str::<Value>(payload) {
                            tally.observe(&event);
                        }
                    }
                }
                send(tx, Bytes::copy_from_slice(line)).await
            }
            WireFormat::OpenAI => {
                let text = String::from_utf8_lossy(line);
                let Some(payload) = data_payload(&text) else {
                    // Comments and separators pass through untouched.
                    return send(tx, Bytes::copy_from_slice(line)).await;
                };

                if payload == DONE_SENTINEL {
                    for event in converter.on_done() {
                        tally.observe(&event.data);
                        send(tx, frame_event(event.event, &event.data)).await?;
                    }
                    return send(tx, Bytes::from_static(b"data: [DONE]\n\n")).await;
                }

                match converter.convert(payload) {
                    Ok(events) => {
                        for event in events {
                            tally.observe(&event.data);
                            send(tx, frame_event(event.event, &event.data)).await?;
                        }
                        Ok(())
                    }
                    Err(e) => {
                        // Skip the chunk; the stream continues.
                        warn!(provider = %self.provider, error = %e, "skipping malformed stream chunk");
                        Ok(())
                    }
                }
            }
        }
    }
}

fn frame_event(event: &str, data: &Value) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))
}

async fn send(
    tx: &mut mpsc::Sender<Result<Bytes, Infallible>>,
    bytes: Bytes,
) -> Result<(), ()> {
    tx.send(Ok(bytes)).await.map_err(|_| ())
}

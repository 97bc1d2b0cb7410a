//! Background benchmarker
//!
//! When a (provider, model) pair sees no organic traffic, its TPS stays
//! stale and the router flies blind. The benchmarker fills the gap: after
//! a warm-up it probes every registered pair on a fixed cadence with a
//! tiny streaming request, skipping pairs that served real traffic within
//! the last minute.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use veloroute_core::{BenchmarkConfig, WireFormat};
use veloroute_egress::{Provider, ProviderRegistry, MESSAGES_PATH};
use veloroute_metrics::{BenchmarkHistory, BenchmarkResult, TpsCache};
use veloroute_routing::ModelRegistry;
use veloroute_transcode::sse::{data_payload, TokenTally, DONE_SENTINEL};
use veloroute_transcode::stream::StreamConverter;

/// A pair with a metric sample younger than this is considered covered by
/// organic traffic and skipped.
const ORGANIC_TRAFFIC_WINDOW: Duration = Duration::from_secs(60);

/// Per-probe deadline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// max_tokens of the probe request, also the fallback token count when a
/// response yields nothing countable.
const PROBE_MAX_TOKENS: u64 = 10;

const PROBE_PROMPT: &str = "Say 'hello' in exactly one word.";

/// Snapshot of the benchmarker's scheduling state.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkStatus {
    pub is_running: bool,
    pub last_run_at: Option<chrono::DateTime<Utc>>,
    pub next_run_at: Option<chrono::DateTime<Utc>>,
    pub total_results: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub interval_secs: u64,
}

#[derive(Debug, Default)]
struct RunState {
    is_running: bool,
    last_run_at: Option<chrono::DateTime<Utc>>,
    next_run_at: Option<chrono::DateTime<Utc>>,
}

pub struct Benchmarker {
    providers: Arc<ProviderRegistry>,
    models: Arc<ModelRegistry>,
    tps: Arc<TpsCache>,
    history: Arc<BenchmarkHistory>,
    interval: Duration,
    warmup: Duration,
    run_state: Mutex<RunState>,
}

impl Benchmarker {
    pub fn new(
        config: &BenchmarkConfig,
        providers: Arc<ProviderRegistry>,
        models: Arc<ModelRegistry>,
        tps: Arc<TpsCache>,
    ) -> Self {
        Self {
            providers,
            models,
            tps,
            history: Arc::new(BenchmarkHistory::new()),
            interval: Duration::from_secs(config.interval_secs),
            warmup: Duration::from_secs(config.warmup_secs),
            run_state: Mutex::new(RunState::default()),
        }
    }

    pub fn history(&self) -> Arc<BenchmarkHistory> {
        Arc::clone(&self.history)
    }

    pub fn status(&self) -> BenchmarkStatus {
        let run_state = self.run_state.lock().expect("benchmark state lock poisoned");
        let (success_count, failure_count) = self.history.outcome_counts();
        BenchmarkStatus {
            is_running: run_state.is_running,
            last_run_at: run_state.last_run_at,
            next_run_at: run_state.next_run_at,
            total_results: self.history.len(),
            success_count,
            failure_count,
            interval_secs: self.interval.as_secs(),
        }
    }

    /// Start the periodic worker: one pass after the warm-up, then one per
    /// interval until the task is dropped.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                warmup_secs = self.warmup.as_secs(),
                interval_secs = self.interval.as_secs(),
                "benchmarker started"
            );
            tokio::time::sleep(self.warmup).await;
            loop {
                self.run_once().await;
                tokio::time::sleep(self.interval).await;
            }
        })
    }

    /// Trigger one pass on a detached task, leaving the tick schedule
    /// untouched. May interleave with a scheduled pass; the history
    /// tolerates that.
    pub fn trigger(self: &Arc<Self>) {
        let benchmarker = Arc::clone(self);
        tokio::spawn(async move {
            benchmarker.run_once().await;
        });
    }

    /// One full pass over every model entry.
    pub async fn run_once(&self) {
        {
            let mut run_state = self.run_state.lock().expect("benchmark state lock poisoned");
            run_state.is_running = true;
            run_state.last_run_at = Some(Utc::now());
            run_state.next_run_at = Some(
                Utc::now()
                    + chrono::Duration::from_std(self.interval)
                        .unwrap_or_else(|_| chrono::Duration::zero()),
            );
        }
        debug!("benchmark pass started");

        for model in self.models.all() {
            let Some(provider) = self.providers.get(&model.provider) else {
                warn!(provider = %model.provider, model = %model.name, "provider not found for model");
                let mut result = BenchmarkResult::pending(&model.provider, &model.name);
                result.error_message = "Provider not found".to_string();
                self.history.push(result);
                continue;
            };

            let result = self.probe(&provider, &model.name).await;
            self.history.push(result);
        }

        self.run_state
            .lock()
            .expect("benchmark state lock poisoned")
            .is_running = false;
        debug!("benchmark pass completed");
    }

    /// Probe a single (provider, model) pair.
    async fn probe(&self, provider: &Provider, model: &str) -> BenchmarkResult {
        let mut result = BenchmarkResult::pending(&provider.name, model);

        if let Some(latest) = self.tps.latest_sample_at(&provider.name, model) {
            let age = Utc::now() - latest;
            if age
                .to_std()
                .map(|age| age < ORGANIC_TRAFFIC_WINDOW)
                .unwrap_or(true)
            {
                debug!(
                    provider = %provider.name,
                    model,
                    age_secs = age.num_seconds(),
                    "skipping benchmark, recent request exists"
                );
                result.success = true;
                result.error_message = "Skipped - recent request exists".to_string();
                return result;
            }
        }

        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": PROBE_PROMPT}],
            "max_tokens": PROBE_MAX_TOKENS,
            "stream": true,
        });
        let body = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(e) => {
                result.error_message = e.to_string();
                return result;
            }
        };

        info!(provider = %provider.name, model, "benchmark probe starting");

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            PROBE_TIMEOUT,
            self.collect_probe_response(provider, &body),
        )
        .await;
        let duration = started.elapsed();

        let sse_body = match outcome {
            Err(_) => {
                warn!(provider = %provider.name, model, "benchmark probe timed out");
                result.error_message =
                    format!("timed out after {}s", PROBE_TIMEOUT.as_secs());
                return result;
            }
            Ok(Err(message)) => {
                warn!(provider = %provider.name, model, error = %message, "benchmark probe failed");
                result.error_message = message;
                return result;
            }
            Ok(Ok(body)) => body,
        };

        let mut tokens = count_stream_tokens(&sse_body, provider.wire_format, model);
        if tokens == 0 {
            debug!(provider = %provider.name, model, "no countable tokens in probe response");
            tokens = PROBE_MAX_TOKENS;
        }

        self.tps.record(&provider.name, model, tokens, duration);

        result.success = true;
        result.tokens = tokens;
        result.duration_secs = duration.as_secs_f64();
        result.tps = self.tps.tps(&provider.name, model);

        debug!(
            provider = %provider.name,
            model,
            tokens,
            tps = result.tps,
            duration_secs = result.duration_secs,
            "benchmark probe recorded"
        );
        result
    }

    /// Issue the probe request and read the whole SSE body.
    async fn collect_probe_response(
        &self,
        provider: &Provider,
        body: &[u8],
    ) -> Result<String, String> {
        let response = provider
            .client
            .proxy_request(MESSAGES_PATH, body, &HashMap::new())
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), error_body));
        }

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Count output tokens in a fully buffered SSE response. OpenAI streams
/// are converted chunk-by-chunk first, so counting always runs over
/// Anthropic events.
fn count_stream_tokens(sse_body: &str, wire_format: WireFormat, model: &str) -> u64 {
    let mut tally = TokenTally::new();
    let mut converter = StreamConverter::new(model);

    for line in sse_body.lines() {
        let Some(payload) = data_payload(line) else {
            continue;
        };
        if payload == DONE_SENTINEL {
            for event in converter.on_done() {
                tally.observe(&event.data);
            }
            continue;
        }

        match wire_format {
            WireFormat::Anthropic => {
                if let Ok(event) = serde_json::from_str::<Value>(payload) {
                    tally.observe(&event);
                }
            }
            WireFormat::OpenAI => match converter.convert(payload) {
                Ok(events) => {
                    for event in events {
                        tally.observe(&event.data);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "skipping malformed chunk in benchmark response");
                }
            },
        }
    }

    tally.total()
}

//! Upstream HTTP client
//!
//! One [`UpstreamClient`] per provider, owning a pooled `reqwest::Client`.
//! The client is where wire formats diverge: for OpenAI providers the
//! Anthropic request body is transcoded and the path rewritten, and auth
//! headers are set per format.

use crate::retry::{backoff_delay, is_retriable_status};
use crate::{EgressError, Result};
use reqwest::{Client, ClientBuilder, Response};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use veloroute_core::{RetryConfig, WireFormat};

pub const MESSAGES_PATH: &str = "/v1/messages";
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Headers never forwarded upstream. Auth is replaced with the provider's
/// own credentials; Accept-Encoding is dropped so responses arrive
/// uncompressed and can be parsed mid-stream; Content-Type is always set
/// explicitly; Host/Content-Length are recomputed by the transport.
const SKIPPED_HEADERS: [&str; 7] = [
    "authorization",
    "x-api-key",
    "anthropic-version",
    "accept-encoding",
    "content-type",
    "host",
    "content-length",
];

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds; generous to cover long streams
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Idle pool timeout in seconds
    pub pool_idle_timeout_secs: u64,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            connect_timeout_secs: 10,
            pool_idle_timeout_secs: 90,
            pool_max_idle_per_host: 10,
        }
    }
}

/// Create a configured HTTP client with connection pooling
pub fn build_http_client(config: &HttpClientConfig) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(format!("Veloroute/{}", env!("CARGO_PKG_VERSION")))
        .use_rustls_tls()
        .build()
        .map_err(|e| EgressError::Config(format!("failed to create HTTP client: {}", e)))
}

/// HTTP client bound to one provider's endpoint, key and wire format.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    endpoint: String,
    api_key: String,
    wire_format: WireFormat,
    http: Client,
}

impl UpstreamClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        wire_format: WireFormat,
    ) -> Result<Self> {
        let http = build_http_client(&HttpClientConfig::default())?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            wire_format,
            http,
        })
    }

    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    /// Forward a request to the provider.
    ///
    /// `/v1/messages` bodies bound for an OpenAI provider are transcoded
    /// and redirected to `/v1/chat/completions`; every other path is
    /// proxied verbatim. The caller decides what to do with non-2xx
    /// responses.
    pub async fn proxy_request(
        &self,
        path: &str,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<Response> {
        let (path, body) = match self.wire_format {
            WireFormat::OpenAI if path == MESSAGES_PATH => {
                let request: serde_json::Value = serde_json::from_slice(body)
                    .map_err(veloroute_transcode::TranscodeError::from)?;
                let converted = veloroute_transcode::request::anthropic_to_openai(&request)?;
                (CHAT_COMPLETIONS_PATH, serde_json::to_vec(&converted)
                    .map_err(veloroute_transcode::TranscodeError::from)?)
            }
            _ => (path, body.to_vec()),
        };

        let url = format!("{}{}", self.endpoint, path);
        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json");

        request = match self.wire_format {
            WireFormat::OpenAI => {
                request.header("Authorization", format!("Bearer {}", self.api_key))
            }
            WireFormat::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        for (name, value) in headers {
            if SKIPPED_HEADERS.contains(&name.to_lowercase().as_str()) {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(url = %url, bytes = body.len(), "forwarding upstream request");
        Ok(request.body(body).send().await?)
    }

    /// [`Self::proxy_request`] wrapped in an exponential-backoff loop.
    ///
    /// Retries transport errors, 429 and 5xx up to `max_retries` extra
    /// attempts; the final response (even a retriable one that exhausted
    /// the budget) is returned so the caller can classify it. Dropping the
    /// future (e.g. on client disconnect) cancels the in-flight attempt
    /// and any pending sleep.
    pub async fn proxy_request_with_retry(
        &self,
        path: &str,
        body: &[u8],
        headers: &HashMap<String, String>,
        retry: &RetryConfig,
    ) -> Result<Response> {
        let mut attempt: u32 = 0;
        loop {
            match self.proxy_request(path, body, headers).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if is_retriable_status(status) && attempt < retry.max_retries {
                        // Drain so the connection can be reused.
                        let _ = response.bytes().await;
                        let delay = backoff_delay(retry, attempt);
                        warn!(
                            status,
                            attempt = attempt + 1,
                            max_retries = retry.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "retriable upstream status, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(EgressError::Http(e)) if attempt < retry.max_retries => {
                    let delay = backoff_delay(retry, attempt);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "upstream request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

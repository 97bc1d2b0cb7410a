//! Configuration snapshot types
//!
//! The gateway is configured from a single YAML document. A parsed
//! [`GatewayConfig`] is the unit of (re)load: the server applies it
//! wholesale to the provider and model registries, so readers observe
//! either the old or the new snapshot, never a mix.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Which request/response schema a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Anthropic messages API (`/v1/messages`)
    #[default]
    Anthropic,
    /// OpenAI chat completions API (`/v1/chat/completions`)
    OpenAI,
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ListenConfig,

    /// Backend providers, keyed by name.
    pub providers: HashMap<String, ProviderConfig>,

    /// Model entries. Order matters: it is the registry scan order, and
    /// duplicates (same model under several providers) form the failover
    /// pool.
    pub models: Vec<ModelConfig>,

    /// Static client API keys. Empty list disables authentication.
    #[serde(default)]
    pub api_keys: Vec<String>,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Minimum mean TPS a candidate must sustain to stay in the preferred
    /// bucket. Candidates with no samples (TPS 0) are always kept.
    #[serde(default = "default_tps_threshold")]
    pub tps_threshold: f64,

    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

impl GatewayConfig {
    /// Validate cross-references and obviously broken values.
    ///
    /// A model referencing an unknown provider is only warned about: the
    /// entry is unusable until a later reload introduces the provider, but
    /// it must not block startup.
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(Error::Config("no providers configured".to_string()));
        }

        for (name, provider) in &self.providers {
            if provider.endpoint.is_empty() {
                return Err(Error::Config(format!(
                    "provider '{}' has an empty endpoint",
                    name
                )));
            }
            if !provider.endpoint.starts_with("http://") && !provider.endpoint.starts_with("https://")
            {
                return Err(Error::Config(format!(
                    "provider '{}' endpoint must be an http(s) URL, got '{}'",
                    name, provider.endpoint
                )));
            }
        }

        if self.models.is_empty() {
            return Err(Error::Config("no models configured".to_string()));
        }

        for model in &self.models {
            if model.name.is_empty() {
                return Err(Error::Config("model with empty name".to_string()));
            }
            if model.provider.is_empty() {
                return Err(Error::Config(format!(
                    "model '{}' has no provider",
                    model.name
                )));
            }
            if !self.providers.contains_key(&model.provider) {
                warn!(
                    model = %model.name,
                    provider = %model.provider,
                    "model references an unknown provider and will be unusable until the next reload"
                );
            }
        }

        if self.tps_threshold < 0.0 {
            return Err(Error::Config(format!(
                "tps_threshold must be non-negative, got {}",
                self.tps_threshold
            )));
        }

        Ok(())
    }
}

/// Listen address for the gateway itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// A backend provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL, e.g. `https://api.anthropic.com`.
    pub endpoint: String,

    #[serde(default)]
    pub api_key: String,

    /// Wire format the provider speaks. Defaults to Anthropic.
    #[serde(rename = "type", default)]
    pub wire_format: WireFormat,
}

impl ProviderConfig {
    /// Whether two configurations describe the same upstream. Used on
    /// reload to decide if the provider (and its connection pool) must be
    /// rebuilt.
    pub fn same_upstream(&self, other: &ProviderConfig) -> bool {
        self.endpoint == other.endpoint
            && self.api_key == other.api_key
            && self.wire_format == other.wire_format
    }
}

/// A model entry.
///
/// `name` is the string sent upstream; `alias` is an optional `*`-glob
/// matched against requested model names when no entry matches exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,

    #[serde(default)]
    pub alias: String,

    pub provider: String,

    /// Context window size in tokens, informational only.
    #[serde(default)]
    pub context: u64,

    /// Routing weight. Values below 1 are treated as 1.
    #[serde(default)]
    pub weight: i64,

    /// Whether the model can serve extended-thinking requests.
    #[serde(default)]
    pub supports_thinking: bool,
}

impl ModelConfig {
    /// Weight with the default of 1 applied.
    pub fn effective_weight(&self) -> u32 {
        if self.weight < 1 {
            1
        } else {
            self.weight as u32
        }
    }
}

/// Same-provider retry policy (exponential backoff).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Whether the dispatcher wraps each upstream attempt in a backoff
    /// loop. Cross-provider failover never sleeps regardless.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Background benchmarker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between benchmark passes.
    #[serde(default = "default_benchmark_interval_secs")]
    pub interval_secs: u64,

    /// Delay before the first pass after startup.
    #[serde(default = "default_benchmark_warmup_secs")]
    pub warmup_secs: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_benchmark_interval_secs(),
            warmup_secs: default_benchmark_warmup_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_tps_threshold() -> f64 {
    40.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_benchmark_interval_secs() -> u64 {
    3_600
}

fn default_benchmark_warmup_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

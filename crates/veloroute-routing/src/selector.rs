//! Candidate selection
//!
//! The selector turns a requested model name into an ordered list of
//! candidates. Ordering is weight first, measured TPS second; candidates
//! below the TPS threshold are dropped unless that would leave nothing.
//! A TPS of exactly 0 means "untested" and always survives the threshold.

use crate::models::ModelRegistry;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use veloroute_core::ModelConfig;
use veloroute_egress::{Provider, ProviderRegistry};
use veloroute_metrics::TpsCache;

pub const DEFAULT_TPS_THRESHOLD: f64 = 40.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("no model found matching the requested name")]
    NoModelFound,

    #[error("no providers available for the requested model")]
    NoProvidersAvailable,
}

/// One routing option for a single request. Owned exclusively by that
/// request and discarded afterwards; the `Arc<Provider>` keeps the
/// provider (and its connection pool) alive even across a hot reload.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: Arc<Provider>,
    pub model: ModelConfig,
    pub weight: u32,
    pub tps: f64,
    /// The model name actually sent upstream.
    pub upstream_model: String,
}

/// Orders providers for a requested model by weight and measured TPS.
pub struct Selector {
    models: Arc<ModelRegistry>,
    providers: Arc<ProviderRegistry>,
    tps: Arc<TpsCache>,
    threshold: f64,
}

impl Selector {
    pub fn new(
        models: Arc<ModelRegistry>,
        providers: Arc<ProviderRegistry>,
        tps: Arc<TpsCache>,
    ) -> Self {
        Self {
            models,
            providers,
            tps,
            threshold: DEFAULT_TPS_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Produce the ordered candidate list for one request.
    pub fn select(
        &self,
        requested: &str,
        thinking_requested: bool,
    ) -> Result<Vec<Candidate>, RouteError> {
        let mut entries = self.models.find_matching(requested);
        if entries.is_empty() {
            return Err(RouteError::NoModelFound);
        }

        if thinking_requested {
            let capable: Vec<ModelConfig> = entries
                .iter()
                .filter(|entry| entry.supports_thinking)
                .cloned()
                .collect();
            if capable.is_empty() {
                warn!(
                    model = requested,
                    "thinking requested but no matching entry supports it, using the full pool"
                );
            } else {
                entries = capable;
            }
        }

        let mut all = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(provider) = self.providers.get(&entry.provider) else {
                continue;
            };
            let tps = self.tps.tps(&provider.name, &entry.name);
            all.push(Candidate {
                weight: entry.effective_weight(),
                tps,
                upstream_model: entry.name.clone(),
                provider,
                model: entry,
            });
        }

        if all.is_empty() {
            return Err(RouteError::NoProvidersAvailable);
        }

        let good: Vec<Candidate> = all
            .iter()
            .filter(|candidate| candidate.tps == 0.0 || candidate.tps >= self.threshold)
            .cloned()
            .collect();

        let mut choices = if good.is_empty() {
            warn!(
                model = requested,
                threshold = self.threshold,
                "no provider meets the TPS threshold, falling back to the full pool"
            );
            all
        } else {
            good
        };

        // Stable sort: equal (weight, tps) pairs keep registry order, so
        // identical registry and metric state always yields the same list.
        choices.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then(b.tps.partial_cmp(&a.tps).unwrap_or(Ordering::Equal))
        });

        debug!(
            model = requested,
            candidates = choices.len(),
            first = %choices[0].provider.name,
            "candidates selected"
        );
        Ok(choices)
    }
}

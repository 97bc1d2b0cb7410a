//! Sliding-window TPS cache

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

/// Number of samples kept per (provider, model). Five keeps the mean
/// responsive: one slow request has a large but not dominant effect.
pub const SAMPLE_WINDOW: usize = 5;

/// A single TPS measurement.
#[derive(Debug, Clone, Serialize)]
pub struct TpsSample {
    pub tps: f64,
    pub tokens: u64,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of one (provider, model) entry.
#[derive(Debug, Clone, Serialize)]
pub struct ModelMetrics {
    pub provider: String,
    pub model: String,
    pub mean_tps: f64,
    pub samples: Vec<TpsSample>,
}

#[derive(Debug, Default)]
struct Entry {
    mean_tps: f64,
    samples: VecDeque<TpsSample>,
}

impl Entry {
    fn push(&mut self, sample: TpsSample) {
        self.samples.push_back(sample);
        while self.samples.len() > SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.mean_tps =
            self.samples.iter().map(|s| s.tps).sum::<f64>() / self.samples.len() as f64;
    }
}

/// Per-(provider, model) ring of recent TPS samples with a cached mean.
///
/// A mean of 0 means "no data" and is treated leniently by the router.
#[derive(Debug, Default)]
pub struct TpsCache {
    inner: RwLock<HashMap<(String, String), Entry>>,
}

impl TpsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request. A zero duration yields a zero-TPS
    /// sample rather than a division by zero.
    pub fn record(&self, provider: &str, model: &str, tokens: u64, duration: Duration) {
        let duration_secs = duration.as_secs_f64();
        let tps = if duration_secs > 0.0 {
            tokens as f64 / duration_secs
        } else {
            0.0
        };

        let sample = TpsSample {
            tps,
            tokens,
            duration_secs,
            timestamp: Utc::now(),
        };

        let mut inner = self.inner.write().expect("tps cache lock poisoned");
        inner
            .entry((provider.to_string(), model.to_string()))
            .or_default()
            .push(sample);
    }

    /// Mean TPS over the window, 0 when the key has no samples.
    pub fn tps(&self, provider: &str, model: &str) -> f64 {
        let inner = self.inner.read().expect("tps cache lock poisoned");
        inner
            .get(&(provider.to_string(), model.to_string()))
            .map(|entry| entry.mean_tps)
            .unwrap_or(0.0)
    }

    /// Timestamp of the most recent sample, if any. Used by the
    /// benchmarker to skip pairs with recent organic traffic.
    pub fn latest_sample_at(&self, provider: &str, model: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().expect("tps cache lock poisoned");
        inner
            .get(&(provider.to_string(), model.to_string()))
            .and_then(|entry| entry.samples.back())
            .map(|sample| sample.timestamp)
    }

    /// Deep-copied view of every entry, for diagnostics.
    pub fn snapshot(&self) -> Vec<ModelMetrics> {
        let inner = self.inner.read().expect("tps cache lock poisoned");
        inner
            .iter()
            .map(|((provider, model), entry)| ModelMetrics {
                provider: provider.clone(),
                model: model.clone(),
                mean_tps: entry.mean_tps,
                samples: entry.samples.iter().cloned().collect(),
            })
            .collect()
    }
}

//! Success/error tracking per provider and per (provider, model)

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

/// A provider is considered healthy while its error rate stays below this.
const HEALTHY_ERROR_RATE: f64 = 0.5;

/// Monotonic counters for one provider or (provider, model) pair. Never
/// reset except on process restart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorStats {
    pub total: u64,
    pub successes: u64,
    pub errors: u64,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Upstream HTTP status of the last error; 0 for network failures.
    pub last_error_status: u16,
    pub error_rate: f64,
}

impl ErrorStats {
    fn record_success(&mut self) {
        self.total += 1;
        self.successes += 1;
        self.recompute_rate();
    }

    fn record_error(&mut self, status: u16) {
        self.total += 1;
        self.errors += 1;
        self.last_error_at = Some(Utc::now());
        self.last_error_status = status;
        self.recompute_rate();
    }

    fn recompute_rate(&mut self) {
        self.error_rate = if self.total == 0 {
            0.0
        } else {
            self.errors as f64 / self.total as f64
        };
    }
}

/// Tracks request outcomes in two maps: coarse per provider (drives the
/// health endpoint) and fine per (provider, model).
#[derive(Debug, Default)]
pub struct ErrorTracker {
    providers: RwLock<HashMap<String, ErrorStats>>,
    models: RwLock<HashMap<(String, String), ErrorStats>>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, provider: &str, model: &str) {
        self.providers
            .write()
            .expect("error tracker lock poisoned")
            .entry(provider.to_string())
            .or_default()
            .record_success();
        self.models
            .write()
            .expect("error tracker lock poisoned")
            .entry((provider.to_string(), model.to_string()))
            .or_default()
            .record_success();
    }

    pub fn record_error(&self, provider: &str, model: &str, status: u16) {
        self.providers
            .write()
            .expect("error tracker lock poisoned")
            .entry(provider.to_string())
            .or_default()
            .record_error(status);
        self.models
            .write()
            .expect("error tracker lock poisoned")
            .entry((provider.to_string(), model.to_string()))
            .or_default()
            .record_error(status);
    }

    /// Error rate for a provider; 0 when the provider has no traffic yet.
    pub fn error_rate(&self, provider: &str) -> f64 {
        self.providers
            .read()
            .expect("error tracker lock poisoned")
            .get(provider)
            .map(|stats| stats.error_rate)
            .unwrap_or(0.0)
    }

    /// Healthy means the error rate is below 50%. Providers with no
    /// traffic are healthy by definition.
    pub fn is_healthy(&self, provider: &str) -> bool {
        self.error_rate(provider) < HEALTHY_ERROR_RATE
    }

    /// Snapshot copy for one provider, if it has seen traffic.
    pub fn provider_stats(&self, provider: &str) -> Option<ErrorStats> {
        self.providers
            .read()
            .expect("error tracker lock poisoned")
            .get(provider)
            .cloned()
    }

    /// Snapshot copy for one (provider, model) pair.
    pub fn model_stats(&self, provider: &str, model: &str) -> Option<ErrorStats> {
        self.models
            .read()
            .expect("error tracker lock poisoned")
            .get(&(provider.to_string(), model.to_string()))
            .cloned()
    }

    /// Snapshot of all provider stats.
    pub fn snapshot(&self) -> HashMap<String, ErrorStats> {
        self.providers
            .read()
            .expect("error tracker lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_healthy() {
        let tracker = ErrorTracker::new();
        assert_eq!(tracker.error_rate("p"), 0.0);
        assert!(tracker.is_healthy("p"));
        assert!(tracker.provider_stats("p").is_none());
    }

    #[test]
    fn test_counts_and_rate() {
        let tracker = ErrorTracker::new();
        tracker.record_success("p", "m");
        tracker.record_success("p", "m");
        tracker.record_error("p", "m", 500);

        let stats = tracker.provider_stats("p").unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.errors, 1);
        assert!((stats.error_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.last_error_status, 500);
        assert!(stats.last_error_at.is_some());
    }

    #[test]
    fn test_rate_bounds() {
        let tracker = ErrorTracker::new();
        for _ in 0..10 {
            tracker.record_error("p", "m", 503);
        }
        let stats = tracker.provider_stats("p").unwrap();
        assert_eq!(stats.error_rate, 1.0);
        assert_eq!(stats.successes + stats.errors, stats.total);

        tracker.record_success("p", "m");
        let stats = tracker.provider_stats("p").unwrap();
        assert!(stats.error_rate > 0.0 && stats.error_rate < 1.0);
    }

    #[test]
    fn test_healthy_threshold() {
        let tracker = ErrorTracker::new();
        tracker.record_success("p", "m");
        tracker.record_error("p", "m", 500);
        // Exactly 50% is unhealthy.
        assert!(!tracker.is_healthy("p"));

        tracker.record_success("p", "m");
        assert!(tracker.is_healthy("p"));
    }

    #[test]
    fn test_network_error_status_zero() {
        let tracker = ErrorTracker::new();
        tracker.record_error("p", "m", 0);
        assert_eq!(tracker.provider_stats("p").unwrap().last_error_status, 0);
    }

    #[test]
    fn test_per_model_stats_are_separate() {
        let tracker = ErrorTracker::new();
        tracker.record_success("p", "m1");
        tracker.record_error("p", "m2", 429);

        assert_eq!(tracker.model_stats("p", "m1").unwrap().errors, 0);
        assert_eq!(tracker.model_stats("p", "m2").unwrap().errors, 1);
        // Provider-level view aggregates both.
        assert_eq!(tracker.provider_stats("p").unwrap().total, 2);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let tracker = ErrorTracker::new();
        tracker.record_success("p", "m");

        let snapshot = tracker.snapshot();
        tracker.record_error("p", "m", 500);

        assert_eq!(snapshot["p"].total, 1);
        assert_eq!(tracker.provider_stats("p").unwrap().total, 2);
    }
}

//! Rolling benchmark result history

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Number of benchmark results retained.
pub const HISTORY_CAPACITY: usize = 100;

/// Outcome of one benchmark probe against a (provider, model) pair.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    pub provider: String,
    pub model: String,
    pub tps: f64,
    pub tokens: u64,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl BenchmarkResult {
    /// A result shell with everything but the outcome filled in.
    pub fn pending(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            tps: 0.0,
            tokens: 0,
            duration_secs: 0.0,
            timestamp: Utc::now(),
            success: false,
            error_message: String::new(),
        }
    }
}

/// FIFO history of the last [`HISTORY_CAPACITY`] results.
///
/// Guarded by its own mutex: manual benchmark runs may interleave with the
/// scheduled tick, so writers must not assume exclusivity.
#[derive(Debug, Default)]
pub struct BenchmarkHistory {
    inner: Mutex<VecDeque<BenchmarkResult>>,
}

impl BenchmarkHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: BenchmarkResult) {
        let mut inner = self.inner.lock().expect("benchmark history lock poisoned");
        inner.push_back(result);
        while inner.len() > HISTORY_CAPACITY {
            inner.pop_front();
        }
    }

    /// Snapshot copy, oldest first.
    pub fn all(&self) -> Vec<BenchmarkResult> {
        self.inner
            .lock()
            .expect("benchmark history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// (successes, failures) over the retained history.
    pub fn outcome_counts(&self) -> (usize, usize) {
        let inner = self.inner.lock().expect("benchmark history lock poisoned");
        let successes = inner.iter().filter(|r| r.success).count();
        (successes, inner.len() - successes)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("benchmark history lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Veloroute Metrics
//!
//! Process-local metric state shared by the router and dispatcher:
//! - [`TpsCache`]: sliding-window tokens-per-second per (provider, model)
//! - [`ErrorTracker`]: success/error counters per provider and per
//!   (provider, model)
//! - [`BenchmarkHistory`]: rolling record of benchmark probe outcomes
//!
//! All structures are guarded by their own readers-writer lock (or mutex)
//! and hand out snapshot copies; readers never hold references into live
//! state.

pub mod cache;
pub mod errors;
pub mod history;

pub use cache::{ModelMetrics, TpsCache, TpsSample, SAMPLE_WINDOW};
pub use errors::{ErrorStats, ErrorTracker};
pub use history::{BenchmarkHistory, BenchmarkResult, HISTORY_CAPACITY};

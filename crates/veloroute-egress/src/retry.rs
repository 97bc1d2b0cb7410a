//! Exponential backoff for same-provider retries
//!
//! Backoff only ever applies within a single provider; advancing to the
//! next failover candidate never sleeps.

use std::time::Duration;
use veloroute_core::RetryConfig;

/// Whether an upstream HTTP status is worth retrying against the same
/// provider: rate limits and server errors. Everything else propagates to
/// the candidate loop immediately.
pub fn is_retriable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Delay before retry number `attempt` (0-based):
/// `initial * multiplier^attempt`, capped at `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let initial = config.initial_delay().as_secs_f64();
    let delay = initial * config.backoff_multiplier.powi(attempt as i32);
    let max = config.max_delay();
    Duration::from_secs_f64(delay).min(max)
}

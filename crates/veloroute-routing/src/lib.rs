//! Veloroute Routing
//!
//! Turns a requested model name into an ordered list of (provider, model)
//! candidates:
//! - [`matcher`]: the `*`-glob alias language
//! - [`models::ModelRegistry`]: insertion-ordered model entries, where
//!   duplicates form the failover pool
//! - [`selector::Selector`]: candidate materialization, TPS threshold
//!   bucketing and weight ordering

pub mod matcher;
pub mod models;
pub mod selector;

pub use models::ModelRegistry;
pub use selector::{Candidate, RouteError, Selector, DEFAULT_TPS_THRESHOLD};

//! Veloroute Gateway Server
//!
//! Ties the routing core together behind an Anthropic-compatible HTTP
//! surface:
//! - `POST /v1/messages`: failover dispatch, streaming and not
//! - `POST /v1/messages/count_tokens`: proxied without body rewrite
//! - `GET /v1/models`, `GET /health`
//!
//! plus the background benchmarker and config hot reload.

pub mod app;
pub mod auth;
pub mod bench;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod reload;
pub mod request_log;
pub mod stream;

pub use app::{build_router, AppState};
pub use bench::Benchmarker;
pub use config::load_config;

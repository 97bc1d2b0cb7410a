//! Veloroute Egress
//!
//! Upstream-facing half of the gateway:
//! - [`client::UpstreamClient`]: issues provider requests, converting the
//!   body and path for OpenAI-format providers and setting per-format auth
//!   headers
//! - [`retry`]: exponential backoff for same-provider retries
//! - [`provider::ProviderRegistry`]: named providers, each owning its
//!   HTTP connection pool, replaced wholesale on reload

use thiserror::Error;

pub mod client;
pub mod provider;
pub mod retry;

pub use client::{UpstreamClient, ANTHROPIC_VERSION, CHAT_COMPLETIONS_PATH, MESSAGES_PATH};
pub use provider::{Provider, ProviderRegistry};

/// Egress-specific errors
#[derive(Debug, Error)]
pub enum EgressError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request body could not be converted for the provider's wire format
    #[error("Failed to convert request body: {0}")]
    Transcode(#[from] veloroute_transcode::TranscodeError),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EgressError>;

impl From<EgressError> for veloroute_core::Error {
    fn from(err: EgressError) -> Self {
        veloroute_core::Error::Provider(err.to_string())
    }
}

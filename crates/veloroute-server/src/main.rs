//! Veloroute gateway server
//!
//! Accepts Anthropic `/v1/messages` requests and fans them out across
//! configured providers with weight- and TPS-ordered failover, converting
//! to and from the OpenAI chat-completions format where a provider
//! requires it.
//!
//! Usage:
//! ```bash
//! veloroute-server --config veloroute.yaml
//!
//! # Or via the environment
//! VELOROUTE_CONFIG=veloroute.yaml veloroute-server
//! ```
//!
//! Test with:
//! ```bash
//! curl http://localhost:8080/v1/messages \
//!   -H "Content-Type: application/json" \
//!   -d '{"model": "claude-sonnet-4", "max_tokens": 64,
//!        "messages": [{"role": "user", "content": "Hello!"}]}'
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use veloroute_server::bench::Benchmarker;
use veloroute_server::{build_router, load_config, reload, AppState};

/// Veloroute - TPS-aware failover gateway for LLM providers
#[derive(Parser)]
#[command(name = "veloroute-server")]
#[command(about = "Anthropic-compatible gateway with weighted, TPS-measured provider failover")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "FILE", env = "VELOROUTE_CONFIG", default_value = "veloroute.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config(&cli.config)?;
    let state = AppState::from_config(&config);

    if config.benchmark.enabled {
        let benchmarker = Arc::new(Benchmarker::new(
            &config.benchmark,
            Arc::clone(&state.providers),
            Arc::clone(&state.models),
            Arc::clone(&state.tps),
        ));
        benchmarker.spawn();
    } else {
        info!("benchmarker disabled by configuration");
    }

    // Keep the watcher alive for the lifetime of the server.
    let _watcher = match reload::watch_config(cli.config.clone(), state.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "config hot reload unavailable");
            None
        }
    };

    let app = build_router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Veloroute gateway listening on http://{}", addr);
    info!("  Anthropic API: http://{}/v1/messages", addr);
    info!("  Model list:    http://{}/v1/models", addr);
    info!("  Health:        http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

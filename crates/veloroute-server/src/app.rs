//! Application state and router wiring

use crate::request_log::{RequestLog, TracingRequestLog};
use crate::{auth, dispatch, handlers};
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::{Arc, RwLock};
use veloroute_core::{GatewayConfig, RetryConfig};
use veloroute_egress::ProviderRegistry;
use veloroute_metrics::{ErrorTracker, TpsCache};
use veloroute_routing::{ModelRegistry, Selector};

/// Shared state behind every handler. Everything is either an `Arc` or
/// lock-guarded so hot reloads swap content without rebuilding the router.
#[derive(Clone)]
pub struct AppState {
    pub providers: Arc<ProviderRegistry>,
    pub models: Arc<ModelRegistry>,
    pub selector: Arc<Selector>,
    pub tps: Arc<TpsCache>,
    pub errors: Arc<ErrorTracker>,
    pub retry: Arc<RwLock<RetryConfig>>,
    pub api_keys: Arc<RwLock<Vec<String>>>,
    pub request_log: Arc<dyn RequestLog>,
}

impl AppState {
    /// Build the full state graph from a configuration snapshot.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let providers = Arc::new(ProviderRegistry::new());
        providers.load(&config.providers);

        let models = Arc::new(ModelRegistry::new());
        models.load(config.models.clone());

        let tps = Arc::new(TpsCache::new());
        let selector = Arc::new(
            Selector::new(Arc::clone(&models), Arc::clone(&providers), Arc::clone(&tps))
                .with_threshold(config.tps_threshold),
        );

        Self {
            providers,
            models,
            selector,
            tps,
            errors: Arc::new(ErrorTracker::new()),
            retry: Arc::new(RwLock::new(config.retry.clone())),
            api_keys: Arc::new(RwLock::new(config.api_keys.clone())),
            request_log: Arc::new(TracingRequestLog),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry.read().expect("retry lock poisoned").clone()
    }
}

/// Assemble the axum router. `/v1/*` routes sit behind the API-key
/// middleware; `/health` does not.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/v1/messages", post(dispatch::handle_messages))
        .route(
            "/v1/messages/count_tokens",
            post(handlers::handle_count_tokens),
        )
        .route("/v1/models", get(handlers::handle_list_models))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(api)
        .route("/health", get(handlers::handle_health))
        .with_state(state)
}

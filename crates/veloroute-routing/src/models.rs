//! Model registry

use crate::matcher::matches_alias;
use std::sync::RwLock;
use tracing::{debug, info};
use veloroute_core::ModelConfig;

/// Insertion-ordered model entries.
///
/// The same canonical model may be registered several times under
/// different providers; overlapping aliases are legal. Those duplicates
/// are exactly what the selector turns into a failover pool, so the
/// registry is a slice, not a map.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    inner: RwLock<Vec<ModelConfig>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, models: Vec<ModelConfig>) {
        for model in &models {
            debug!(name = %model.name, alias = %model.alias, provider = %model.provider, "loaded model");
        }
        let count = models.len();
        *self.inner.write().expect("model registry lock poisoned") = models;
        info!(models = count, "model registry loaded");
    }

    /// Replace all entries atomically.
    pub fn update(&self, models: Vec<ModelConfig>) {
        let count = models.len();
        *self.inner.write().expect("model registry lock poisoned") = models;
        info!(models = count, "model registry updated");
    }

    /// All entries whose name equals `requested`; when there are none, all
    /// entries whose alias glob matches it. Scan order is insertion order.
    pub fn find_matching(&self, requested: &str) -> Vec<ModelConfig> {
        let inner = self.inner.read().expect("model registry lock poisoned");

        let exact: Vec<ModelConfig> = inner
            .iter()
            .filter(|model| model.name == requested)
            .cloned()
            .collect();
        if !exact.is_empty() {
            return exact;
        }

        inner
            .iter()
            .filter(|model| !model.alias.is_empty() && matches_alias(&model.alias, requested))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<ModelConfig> {
        self.inner
            .read()
            .expect("model registry lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("model registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

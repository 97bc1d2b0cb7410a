//! Providers and the provider registry

use crate::client::UpstreamClient;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use veloroute_core::{ProviderConfig, WireFormat};

/// A configured upstream provider. Immutable once built; owns its HTTP
/// connection pool. Model entries reference providers by name only, so
/// replacing a provider on reload never invalidates a registry entry.
#[derive(Debug)]
pub struct Provider {
    pub name: String,
    pub wire_format: WireFormat,
    pub endpoint: String,
    pub client: UpstreamClient,
    config: ProviderConfig,
}

impl Provider {
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self> {
        let client =
            UpstreamClient::new(&config.endpoint, &config.api_key, config.wire_format)?;
        Ok(Self {
            name: name.to_string(),
            wire_format: config.wire_format,
            endpoint: config.endpoint.clone(),
            client,
            config: config.clone(),
        })
    }
}

/// Named providers behind a readers-writer lock.
///
/// `update` replaces the map contents wholesale: readers see either the
/// old or the new set, never a partial one. Requests already holding an
/// `Arc<Provider>` keep using it (and its connection pool) until they
/// finish, even if the provider was removed or replaced.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    inner: RwLock<HashMap<String, Arc<Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the registry at startup. Providers whose HTTP client
    /// cannot be built are skipped with a warning.
    pub fn load(&self, configs: &HashMap<String, ProviderConfig>) {
        let mut providers = HashMap::with_capacity(configs.len());
        for (name, config) in configs {
            match Provider::from_config(name, config) {
                Ok(provider) => {
                    providers.insert(name.clone(), Arc::new(provider));
                }
                Err(e) => warn!(provider = %name, error = %e, "skipping provider"),
            }
        }
        let count = providers.len();
        *self.inner.write().expect("provider registry lock poisoned") = providers;
        info!(providers = count, "provider registry loaded");
    }

    /// Apply a new configuration snapshot. Unchanged providers keep their
    /// existing client (and connection pool); changed ones are rebuilt;
    /// absent ones are dropped.
    pub fn update(&self, configs: &HashMap<String, ProviderConfig>) {
        let mut inner = self.inner.write().expect("provider registry lock poisoned");

        let mut next = HashMap::with_capacity(configs.len());
        for (name, config) in configs {
            match inner.get(name) {
                Some(existing) if existing.config.same_upstream(config) => {
                    next.insert(name.clone(), Arc::clone(existing));
                }
                previous => match Provider::from_config(name, config) {
                    Ok(provider) => {
                        if previous.is_some() {
                            info!(provider = %name, endpoint = %config.endpoint, "provider replaced");
                        } else {
                            info!(provider = %name, endpoint = %config.endpoint, "provider added");
                        }
                        next.insert(name.clone(), Arc::new(provider));
                    }
                    Err(e) => warn!(provider = %name, error = %e, "skipping provider"),
                },
            }
        }

        for name in inner.keys() {
            if !next.contains_key(name) {
                info!(provider = %name, "provider removed");
            }
        }

        *inner = next;
    }

    pub fn get(&self, name: &str) -> Option<Arc<Provider>> {
        self.inner
            .read()
            .expect("provider registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<Provider>> {
        self.inner
            .read()
            .expect("provider registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("provider registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

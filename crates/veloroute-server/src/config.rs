//! Configuration file loading

use std::path::Path;
use tracing::info;
use veloroute_core::{Error, GatewayConfig, Result};

/// Read, parse and validate the YAML configuration file.
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: GatewayConfig = serde_yaml::from_str(&contents)
        .map_err(|e| Error::Config(format!("invalid YAML in {}: {}", path.display(), e)))?;
    config.validate()?;

    info!(
        path = %path.display(),
        providers = config.providers.len(),
        models = config.models.len(),
        "configuration loaded"
    );
    Ok(config)
}

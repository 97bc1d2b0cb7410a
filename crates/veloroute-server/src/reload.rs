//! Configuration hot reload
//!
//! Watches the config file and applies changed snapshots to the running
//! registries. Both registries swap atomically, so a request either sees
//! the old configuration or the new one; requests already holding a
//! provider keep it until they finish. An invalid new file is logged and
//! ignored.

use crate::app::AppState;
use crate::config::load_config;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Start watching `path`. The returned watcher must stay alive for the
/// lifetime of the server; dropping it stops the reloads.
pub fn watch_config(path: PathBuf, state: AppState) -> notify::Result<RecommendedWatcher> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(4);

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        if let Ok(event) = event {
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                // A full channel just means a reload is already pending.
                let _ = tx.try_send(());
            }
        }
    })?;
    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "watching configuration file");

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            apply_reload(&path, &state);
        }
    });

    Ok(watcher)
}

/// Re-read the file and swap the new snapshot in.
pub fn apply_reload(path: &Path, state: &AppState) {
    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring invalid configuration");
            return;
        }
    };

    state.providers.update(&config.providers);
    state.models.update(config.models.clone());
    *state.retry.write().expect("retry lock poisoned") = config.retry.clone();
    *state.api_keys.write().expect("api keys lock poisoned") = config.api_keys.clone();

    if (config.tps_threshold - state.selector.threshold()).abs() > f64::EPSILON {
        warn!(
            configured = config.tps_threshold,
            active = state.selector.threshold(),
            "tps_threshold changes require a restart"
        );
    }

    info!(
        providers = config.providers.len(),
        models = config.models.len(),
        "configuration reloaded"
    );
}

use super::{read_config, SyncConfig};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

pub const CONFIG_PATH_VAR: &str = "STATESYNC_CONFIG";
pub const BASE_URL_VAR: &str = "STATESYNC_BASE_URL";
pub const REQUEST_TIMEOUT_VAR: &str = "STATESYNC_REQUEST_TIMEOUT_MS";
pub const MAX_RETRIES_VAR: &str = "STATESYNC_MAX_RETRIES";

/// Select the config for the binary: file named by `STATESYNC_CONFIG` (or
/// defaults), then env overrides, then validation.
pub fn resolve_config() -> Result<SyncConfig> {
    resolve_config_from(|key| std::env::var(key).ok())
}

/// Same as [`resolve_config`] with an injectable lookup.
///
/// An unset or missing config file falls back to defaults. A file that
/// exists but does not parse is an error.
pub fn resolve_config_from<F>(lookup: F) -> Result<SyncConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match lookup(CONFIG_PATH_VAR).filter(|p| !p.is_empty()) {
        Some(path) if Path::new(&path).exists() => {
            info!(path = %path, "Loading configuration file");
            read_config(&path)?
        }
        Some(path) => {
            warn!(path = %path, "Config file not found, using default configuration");
            SyncConfig::default()
        }
        None => {
            info!("{} not set, using default configuration", CONFIG_PATH_VAR);
            SyncConfig::default()
        }
    };

    apply_overrides_from(&mut config, &lookup);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Apply env overrides on top of a loaded (or default) config. Unparseable
/// values are ignored and the existing setting is kept.
pub fn apply_overrides_from<F>(config: &mut SyncConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(BASE_URL_VAR) {
        if !v.is_empty() {
            config.server.base_url = v;
        }
    }
    if let Some(v) = lookup(REQUEST_TIMEOUT_VAR) {
        if let Ok(n) = v.parse::<u64>() {
            config.server.request_timeout_ms = n;
        }
    }
    if let Some(v) = lookup(MAX_RETRIES_VAR) {
        if let Ok(n) = v.parse::<u32>() {
            config.retry.max_retries = n;
        }
    }
}

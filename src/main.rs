use anyhow::{Context, Result};
use statesync::config::resolve_config;
use statesync::{EntityRegistry, SyncDriver};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statesync=info".into()),
        )
        .init();

    info!("statesync starting...");

    let config = resolve_config()?;
    info!(
        base_url = %config.server.base_url,
        resources = config.resources.len(),
        retries = config.retry.max_retries,
        "Configuration loaded"
    );

    // Mirror every configured entity in memory
    let (registry, mirrors) = EntityRegistry::with_mirrors(&config.entities);
    let registry = Arc::new(registry);
    info!(entity_count = registry.len(), "Entity registry ready");

    let mut driver = SyncDriver::new(config, registry)?;
    let started = driver.start();
    if started == 0 {
        warn!("No resources enabled, nothing to poll");
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    driver.shutdown().await;

    for (name, status) in driver.status().await {
        info!(
            resource = %name,
            polls = status.poll_count,
            errors = status.error_count,
            last_error = status.last_error.as_deref().unwrap_or("none"),
            "Final resource status"
        );
    }

    let never_updated = mirrors.iter().filter(|m| m.update_count() == 0).count();
    let last_update = mirrors.iter().filter_map(|m| m.last_updated()).max();
    info!(
        entities = mirrors.len(),
        never_updated = never_updated,
        last_update = ?last_update,
        "Final mirror status"
    );

    info!("statesync stopped");
    Ok(())
}

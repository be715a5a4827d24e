//! Sync driver - Owns every poll task for one simulation server.
//!
//! Starts a one-shot fetch or a repeating loop per enabled resource and
//! cancels all of them on shutdown (or drop).

use super::client::StateSyncClient;
use super::poll_loop::{PollLoop, PollStatus};
use crate::config::SyncConfig;
use crate::registry::Resolve;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct SyncDriver {
    config: SyncConfig,
    client: Arc<StateSyncClient>,
    shutdown_tx: watch::Sender<bool>,
    /// Task handles keyed by resource name
    handles: Vec<(String, JoinHandle<()>)>,
    status_map: BTreeMap<String, Arc<Mutex<PollStatus>>>,
}

impl SyncDriver {
    /// Validates the config and builds the shared HTTP client.
    pub fn new(config: SyncConfig, resolver: Arc<dyn Resolve>) -> Result<Self> {
        config.validate()?;
        let client = StateSyncClient::new(&config.server, resolver)
            .context("Failed to build HTTP client")?
            .with_retry(config.retry.clone());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            client: Arc::new(client),
            shutdown_tx,
            handles: Vec::new(),
            status_map: BTreeMap::new(),
        })
    }

    /// Spawns one task per enabled resource.
    ///
    /// # Returns
    /// Number of tasks started (0 if already running)
    pub fn start(&mut self) -> usize {
        if !self.handles.is_empty() {
            warn!("Sync driver already started");
            return 0;
        }

        info!(base_url = %self.client.base_url(), "Starting sync driver");

        for (name, resource) in &self.config.resources {
            if !resource.enabled {
                info!(resource = %name, "Resource disabled, skipping");
                continue;
            }

            let poll_loop =
                PollLoop::new(name.clone(), resource.clone(), Arc::clone(&self.client));
            self.status_map.insert(name.clone(), poll_loop.status());

            info!(
                resource = %name,
                url = %self.config.url_for(&resource.path),
                repeat = resource.repeat,
                "Tracking resource"
            );
            let shutdown = self.shutdown_tx.subscribe();
            let handle = if resource.repeat {
                poll_loop.start(shutdown)
            } else {
                poll_loop.start_once(shutdown)
            };
            self.handles.push((name.clone(), handle));
        }

        info!(task_count = self.handles.len(), "Sync driver started");
        self.handles.len()
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|(_, handle)| !handle.is_finished())
    }

    /// Snapshot of every resource's status.
    pub async fn status(&self) -> BTreeMap<String, PollStatus> {
        let mut snapshot = BTreeMap::new();
        for (name, status) in &self.status_map {
            snapshot.insert(name.clone(), status.lock().await.clone());
        }
        snapshot
    }

    /// Signals every task to stop and waits for them to finish.
    pub async fn shutdown(&mut self) {
        info!(task_count = self.handles.len(), "Shutting down sync driver");

        // No receivers left just means every task already exited
        let _ = self.shutdown_tx.send(true);

        for (name, handle) in self.handles.drain(..) {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(resource = %name, error = %e, "Poll task ended abnormally");
                }
            }
        }

        info!("All poll tasks stopped");
    }
}

impl Drop for SyncDriver {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for (_, handle) in self.handles.drain(..) {
            handle.abort();
        }
    }
}

//! Per-resource polling loop.
//!
//! Each tracked resource gets its own task that requests, applies, then
//! sleeps. A cycle never overlaps the previous one.

use super::client::{ApplyReport, StateSyncClient};
use crate::config::ResourceConfig;
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where a loop currently is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    /// Request in flight (initial state)
    AwaitingResponse,
    /// Waiting for the interval to elapse
    Sleeping,
    /// Owner shut the loop down, or a one-shot fetch finished
    Stopped,
}

/// Status information for a resource loop.
#[derive(Clone, Debug)]
pub struct PollStatus {
    pub state: PollState,
    /// Last successful cycle
    pub last_poll: Option<DateTime<Utc>>,
    /// Last error message (cleared on success)
    pub last_error: Option<String>,
    /// Total successful cycles
    pub poll_count: u64,
    /// Total failed cycles
    pub error_count: u64,
    /// Counters from the last successful cycle
    pub last_report: Option<ApplyReport>,
}

impl Default for PollStatus {
    fn default() -> Self {
        Self {
            state: PollState::AwaitingResponse,
            last_poll: None,
            last_error: None,
            poll_count: 0,
            error_count: 0,
            last_report: None,
        }
    }
}

/// Polling loop for one resource.
pub struct PollLoop {
    name: String,
    resource: ResourceConfig,
    client: Arc<StateSyncClient>,
    status: Arc<Mutex<PollStatus>>,
}

impl PollLoop {
    pub fn new(name: String, resource: ResourceConfig, client: Arc<StateSyncClient>) -> Self {
        Self {
            name,
            resource,
            client,
            status: Arc::new(Mutex::new(PollStatus::default())),
        }
    }

    /// Returns a clone of the status tracker for external monitoring.
    pub fn status(&self) -> Arc<Mutex<PollStatus>> {
        Arc::clone(&self.status)
    }

    /// Spawns the repeating loop. It runs until `shutdown` flips to `true`
    /// or its sender is dropped.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Spawns a single fetch (initial placement of fixed entities).
    pub fn start_once(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run_once(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            resource = %self.name,
            path = %self.resource.path,
            interval_ms = self.resource.interval_ms,
            "Starting poll loop"
        );

        loop {
            self.set_state(PollState::AwaitingResponse).await;

            let outcome = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                outcome = self.client.poll_with_retry(&self.resource) => outcome,
            };
            self.record(outcome).await;

            self.set_state(PollState::Sleeping).await;

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(self.resource.interval()) => {}
            }
        }

        self.set_state(PollState::Stopped).await;
        info!(resource = %self.name, "Poll loop stopped");
    }

    pub async fn run_once(self, mut shutdown: watch::Receiver<bool>) {
        debug!(resource = %self.name, path = %self.resource.path, "Fetching once");

        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => {
                info!(resource = %self.name, "One-shot fetch cancelled");
            }
            outcome = self.client.fetch_once(&self.name, &self.resource) => {
                self.record(outcome).await;
            }
        }

        self.set_state(PollState::Stopped).await;
    }

    async fn set_state(&self, state: PollState) {
        self.status.lock().await.state = state;
    }

    async fn record(&self, outcome: Result<ApplyReport, SyncError>) {
        let mut status = self.status.lock().await;
        match outcome {
            Ok(report) => {
                debug!(
                    resource = %self.name,
                    records = report.total(),
                    applied = report.applied,
                    unknown = report.unknown,
                    malformed = report.malformed,
                    no_capability = report.no_capability,
                    "Cycle applied"
                );
                status.last_poll = Some(Utc::now());
                status.last_error = None;
                status.poll_count += 1;
                status.last_report = Some(report);
            }
            Err(e) => {
                warn!(
                    resource = %self.name,
                    kind = e.kind(),
                    error = %e,
                    "Poll cycle failed, skipping"
                );
                status.last_error = Some(e.to_string());
                status.error_count += 1;
            }
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender counts as shutdown.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResourceKind, ServerConfig};
    use crate::model::{Coordinates, LightColor};
    use crate::registry::{EntityRegistry, MirrorObject};
    use mockito::Server;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn client_for(url: String, registry: Arc<EntityRegistry>) -> Arc<StateSyncClient> {
        let server = ServerConfig {
            base_url: url,
            request_timeout_ms: 10_000,
        };
        Arc::new(StateSyncClient::new(&server, registry).unwrap())
    }

    /// Polls `check` until it holds or two seconds pass.
    async fn eventually<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_loop_applies_and_stops_on_shutdown() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/get_car_positions")
            .with_status(200)
            .with_body(r#"[{"id":"car_205","position":[1.5,2.5]}]"#)
            .create_async()
            .await;

        let registry = Arc::new(EntityRegistry::new());
        let car = Arc::new(MirrorObject::new("car_205"));
        registry.register("car_205", car.clone());

        let resource =
            ResourceConfig::new("/get_car_positions", ResourceKind::Positions, 20, true);
        let poll_loop = PollLoop::new(
            "car_positions".to_string(),
            resource,
            client_for(server.url(), registry),
        );
        let status = poll_loop.status();
        let (tx, rx) = watch::channel(false);
        let handle = poll_loop.start(rx);

        // Several cycles must run
        assert!(eventually(|| car.update_count() >= 3).await);
        assert_eq!(car.position(), Some(Coordinates::new(1.5, 0.0, 2.5)));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop")
            .unwrap();

        let status = status.lock().await;
        assert_eq!(status.state, PollState::Stopped);
        assert!(status.poll_count >= 3);
        assert_eq!(status.error_count, 0);
        assert_eq!(status.last_report.as_ref().unwrap().applied, 1);
    }

    #[tokio::test]
    async fn test_loop_survives_failed_cycle() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/get_traffic_light_states")
            .with_status(500)
            .create_async()
            .await;

        let registry = Arc::new(EntityRegistry::new());
        let light = Arc::new(MirrorObject::with_light_surface("traffic_light_3"));
        registry.register("traffic_light_3", light.clone());

        let resource = ResourceConfig::new(
            "/get_traffic_light_states",
            ResourceKind::LightStates,
            20,
            true,
        );
        let poll_loop = PollLoop::new(
            "traffic_light_states".to_string(),
            resource,
            client_for(server.url(), registry),
        );
        let status = poll_loop.status();
        let (tx, rx) = watch::channel(false);
        let handle = poll_loop.start(rx);

        let saw_error = {
            let status = Arc::clone(&status);
            eventually(move || {
                status
                    .try_lock()
                    .map(|s| s.error_count >= 1)
                    .unwrap_or(false)
            })
            .await
        };
        assert!(saw_error);
        assert_eq!(light.light_color(), None);

        failing.remove_async().await;
        let _ok = server
            .mock("GET", "/get_traffic_light_states")
            .with_status(200)
            .with_body(r#"[{"id":"traffic_light_3","state":"red"}]"#)
            .create_async()
            .await;

        assert!(eventually(|| light.light_color() == Some(LightColor::Red)).await);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop after sender dropped")
            .unwrap();

        let status = status.lock().await;
        assert!(status.poll_count >= 1);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_request() {
        // Accepts connections and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let registry = Arc::new(EntityRegistry::new());
        let resource =
            ResourceConfig::new("/get_car_positions", ResourceKind::Positions, 1000, true);
        let poll_loop = PollLoop::new(
            "car_positions".to_string(),
            resource,
            client_for(format!("http://{}", addr), registry),
        );
        let status = poll_loop.status();
        let (tx, rx) = watch::channel(false);
        let handle = poll_loop.start(rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(status.lock().await.state, PollState::AwaitingResponse);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("in-flight request was not cancelled")
            .unwrap();

        let status = status.lock().await;
        assert_eq!(status.state, PollState::Stopped);
        assert_eq!(status.poll_count, 0);
        assert_eq!(status.error_count, 0);
    }

    #[tokio::test]
    async fn test_run_once_fetches_exactly_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/get_traffic_light_positions")
            .with_status(200)
            .with_body(r#"[{"id":"traffic_light_1","position":[3,4]}]"#)
            .expect(1)
            .create_async()
            .await;

        let registry = Arc::new(EntityRegistry::new());
        let light = Arc::new(MirrorObject::with_light_surface("traffic_light_1"));
        registry.register("traffic_light_1", light.clone());

        let resource = ResourceConfig::new(
            "/get_traffic_light_positions",
            ResourceKind::Positions,
            1000,
            false,
        );
        let poll_loop = PollLoop::new(
            "traffic_light_positions".to_string(),
            resource,
            client_for(server.url(), registry),
        );
        let status = poll_loop.status();
        let (_tx, rx) = watch::channel(false);
        poll_loop.start_once(rx).await.unwrap();

        mock.assert_async().await;
        assert_eq!(light.position(), Some(Coordinates::new(3.0, 0.0, 4.0)));

        let status = status.lock().await;
        assert_eq!(status.state, PollState::Stopped);
        assert_eq!(status.poll_count, 1);
    }
}

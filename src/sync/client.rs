use crate::config::{join_url, ResourceConfig, ResourceKind, RetryConfig, ServerConfig};
use crate::error::SyncError;
use crate::model::{decode_light_states, decode_positions, EntityPosition, LightState};
use crate::registry::Resolve;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-cycle outcome counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Records applied to a handle
    pub applied: usize,
    /// Records whose id resolved to nothing
    pub unknown: usize,
    /// Position records without exactly two numeric elements
    pub malformed: usize,
    /// Light records whose handle has no light surface
    pub no_capability: usize,
}

impl ApplyReport {
    pub fn total(&self) -> usize {
        self.applied + self.unknown + self.malformed + self.no_capability
    }
}

/// HTTP client for the simulation server.
///
/// Fetches a resource, decodes it into a batch and pushes each record to the
/// handle returned by the resolver. Holds no state between cycles.
pub struct StateSyncClient {
    http_client: Client,
    base_url: String,
    resolver: Arc<dyn Resolve>,
    retry: RetryConfig,
}

impl StateSyncClient {
    pub fn new(server: &ServerConfig, resolver: Arc<dyn Resolve>) -> Result<Self, SyncError> {
        let http_client = Client::builder()
            .user_agent(concat!("statesync/", env!("CARGO_PKG_VERSION")))
            .timeout(server.request_timeout())
            .build()?;
        Ok(Self {
            http_client,
            base_url: server.base_url.clone(),
            resolver,
            retry: RetryConfig::default(),
        })
    }

    /// Enable bounded in-cycle retries.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One position cycle: GET, decode, apply.
    pub async fn poll_positions(&self, path: &str) -> Result<ApplyReport, SyncError> {
        let body = self.fetch_body(path).await?;
        let batch = decode_positions(&body)?;
        Ok(self.apply_positions(&batch))
    }

    /// One light-state cycle: GET, decode, apply.
    pub async fn poll_light_states(&self, path: &str) -> Result<ApplyReport, SyncError> {
        let body = self.fetch_body(path).await?;
        let batch = decode_light_states(&body)?;
        Ok(self.apply_light_states(&batch))
    }

    /// One cycle for a configured resource, dispatched on its kind.
    pub async fn poll(&self, resource: &ResourceConfig) -> Result<ApplyReport, SyncError> {
        match resource.kind {
            ResourceKind::Positions => self.poll_positions(&resource.path).await,
            ResourceKind::LightStates => self.poll_light_states(&resource.path).await,
        }
    }

    /// [`poll`](Self::poll) with the configured retry policy.
    ///
    /// Only transport failures and 5xx responses are retried; a body that
    /// does not decode will not decode on the next attempt either.
    pub async fn poll_with_retry(
        &self,
        resource: &ResourceConfig,
    ) -> Result<ApplyReport, SyncError> {
        let mut attempt = 0;
        loop {
            match self.poll(resource).await {
                Ok(report) => return Ok(report),
                Err(e) if attempt < self.retry.max_retries && e.is_retryable() => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        path = %resource.path,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Poll failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single non-repeating cycle, used for the initial placement of
    /// fixed entities.
    pub async fn fetch_once(
        &self,
        name: &str,
        resource: &ResourceConfig,
    ) -> Result<ApplyReport, SyncError> {
        let report = self.poll_with_retry(resource).await?;
        info!(
            resource = %name,
            applied = report.applied,
            unknown = report.unknown,
            malformed = report.malformed,
            "Initial fetch applied"
        );
        Ok(report)
    }

    /// Apply a position batch. Unknown ids and malformed positions are
    /// skipped individually.
    pub fn apply_positions(&self, batch: &[EntityPosition]) -> ApplyReport {
        let mut report = ApplyReport::default();

        for record in batch {
            let Some(handle) = self.resolver.resolve(&record.id) else {
                report.unknown += 1;
                continue;
            };
            match record.coordinates() {
                Some(coordinates) => {
                    handle.set_position(coordinates);
                    report.applied += 1;
                }
                None => {
                    debug!(entity_id = %record.id, position = ?record.position, "Skipping malformed position");
                    report.malformed += 1;
                }
            }
        }

        report
    }

    /// Apply a light-state batch through each handle's light surface.
    pub fn apply_light_states(&self, batch: &[LightState]) -> ApplyReport {
        let mut report = ApplyReport::default();

        for record in batch {
            let Some(handle) = self.resolver.resolve(&record.id) else {
                report.unknown += 1;
                continue;
            };
            if !record.is_known_token() {
                debug!(entity_id = %record.id, state = ?record.state, "Unrecognized light state, treating as green");
            }
            match handle.light_surface() {
                Some(surface) => {
                    surface.set_light_state(record.color());
                    report.applied += 1;
                }
                None => report.no_capability += 1,
            }
        }

        report
    }

    async fn fetch_body(&self, path: &str) -> Result<String, SyncError> {
        let url = join_url(&self.base_url, path);
        let response = self.http_client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(SyncError::Status { status, body });
        }

        Ok(response.text().await?)
    }
}

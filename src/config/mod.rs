pub mod env;
pub use env::resolve_config;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Complete statesync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub entities: EntitiesConfig,
    /// Tracked resources keyed by name. When present in a file, this table
    /// replaces the default set instead of merging with it.
    #[serde(default = "default_resources")]
    pub resources: BTreeMap<String, ResourceConfig>,
}

/// Simulation server endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Bounded in-cycle retry. `max_retries = 0` means a failed cycle is simply
/// skipped until the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before each retry (milliseconds); the last entry repeats.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
}

fn default_backoff_ms() -> Vec<u64> {
    vec![250, 500, 1000]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = self
            .backoff_ms
            .get(attempt as usize)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}

/// Contiguous run of numbered ids, e.g. `car_205..=car_222`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub prefix: String,
    pub start: u32,
    pub end: u32,
}

impl IdRange {
    pub fn new(prefix: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            prefix: prefix.into(),
            start,
            end,
        }
    }

    /// Expand to the full id list (inclusive on both ends).
    pub fn ids(&self) -> Vec<String> {
        (self.start..=self.end)
            .map(|n| format!("{}{}", self.prefix, n))
            .collect()
    }
}

/// Entity ids registered at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesConfig {
    #[serde(default = "default_cars")]
    pub cars: IdRange,
    #[serde(default = "default_traffic_lights")]
    pub traffic_lights: IdRange,
    /// Additional ids tracked without a light surface
    #[serde(default)]
    pub extra: Vec<String>,
}

fn default_cars() -> IdRange {
    IdRange::new("car_", 205, 222)
}

fn default_traffic_lights() -> IdRange {
    IdRange::new("traffic_light_", 1, 25)
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            cars: default_cars(),
            traffic_lights: default_traffic_lights(),
            extra: Vec::new(),
        }
    }
}

/// What a resource's records look like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Positions,
    LightStates,
}

/// One polled endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Path appended to `server.base_url`, e.g. `/get_car_positions`
    pub path: String,
    pub kind: ResourceKind,
    /// Sleep between cycles (milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// `false` = fetch exactly once at startup
    #[serde(default = "default_true")]
    pub repeat: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl ResourceConfig {
    pub fn new(path: &str, kind: ResourceKind, interval_ms: u64, repeat: bool) -> Self {
        Self {
            path: path.to_string(),
            kind,
            interval_ms,
            repeat,
            enabled: true,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_resources() -> BTreeMap<String, ResourceConfig> {
    let mut resources = BTreeMap::new();
    resources.insert(
        "car_positions".to_string(),
        ResourceConfig::new("/get_car_positions", ResourceKind::Positions, 1000, true),
    );
    resources.insert(
        "traffic_light_positions".to_string(),
        ResourceConfig::new(
            "/get_traffic_light_positions",
            ResourceKind::Positions,
            1000,
            false,
        ),
    );
    resources.insert(
        "traffic_light_states".to_string(),
        ResourceConfig::new(
            "/get_traffic_light_states",
            ResourceKind::LightStates,
            1000,
            true,
        ),
    );
    resources
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            retry: RetryConfig::default(),
            entities: EntitiesConfig::default(),
            resources: default_resources(),
        }
    }
}

impl SyncConfig {
    /// Reject configurations that would busy-loop or build bad URLs.
    pub fn validate(&self) -> Result<()> {
        if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            bail!("server.base_url must be an http(s) URL: {}", self.server.base_url);
        }
        if self.server.request_timeout_ms == 0 {
            bail!("server.request_timeout_ms must be greater than 0");
        }
        for range in [&self.entities.cars, &self.entities.traffic_lights] {
            if range.start > range.end {
                bail!(
                    "entity range {}{}..{} is empty (start > end)",
                    range.prefix,
                    range.start,
                    range.end
                );
            }
        }
        for (name, resource) in &self.resources {
            if !resource.path.starts_with('/') {
                bail!("resources.{}.path must start with '/': {}", name, resource.path);
            }
            if resource.repeat && resource.interval_ms == 0 {
                bail!("resources.{}.interval_ms must be greater than 0", name);
            }
        }
        Ok(())
    }

    /// Full URL for a resource path
    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.server.base_url, path)
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Parse a TOML file without validating it (overrides may still apply).
pub fn read_config(path: impl AsRef<Path>) -> Result<SyncConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.server.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.entities.cars.ids().len(), 18);
        assert_eq!(config.entities.traffic_lights.ids().len(), 25);
        assert_eq!(config.resources.len(), 3);

        let lights = &config.resources["traffic_light_positions"];
        assert!(!lights.repeat);
        assert_eq!(config.resources["traffic_light_states"].kind, ResourceKind::LightStates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            base_url = "http://sim.local:8000"
            request_timeout_ms = 250

            [retry]
            max_retries = 2
            backoff_ms = [10, 20]

            [entities]
            cars = { prefix = "car_", start = 1, end = 3 }
            traffic_lights = { prefix = "tl_", start = 1, end = 2 }
            extra = ["parking_1"]

            [resources.positions]
            path = "/get_positions"
            kind = "positions"
            interval_ms = 1

            [resources.agents]
            path = "/get_agents_positions"
            kind = "positions"
            repeat = false
        "#;

        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.base_url, "http://sim.local:8000");
        assert_eq!(config.server.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.entities.cars.ids(), vec!["car_1", "car_2", "car_3"]);
        assert_eq!(config.entities.extra, vec!["parking_1"]);

        // Explicit resources replace the defaults
        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.resources["positions"].interval(), Duration::from_millis(1));
        assert!(config.resources["positions"].repeat);
        assert!(!config.resources["agents"].repeat);
        assert!(config.resources["agents"].enabled);
        assert_eq!(
            config.url_for(&config.resources["positions"].path),
            "http://sim.local:8000/get_positions"
        );
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [retry]
            max_retries = 1
        "#;

        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.backoff_ms, vec![250, 500, 1000]);
        assert_eq!(config.server.request_timeout_ms, 5000);
        assert_eq!(config.resources.len(), 3);
    }

    #[test]
    fn test_retry_delay_repeats_last_entry() {
        let retry = RetryConfig {
            max_retries: 5,
            backoff_ms: vec![10, 20],
        };
        assert_eq!(retry.delay_for(0), Duration::from_millis(10));
        assert_eq!(retry.delay_for(1), Duration::from_millis(20));
        assert_eq!(retry.delay_for(4), Duration::from_millis(20));

        let none = RetryConfig {
            max_retries: 1,
            backoff_ms: Vec::new(),
        };
        assert_eq!(none.delay_for(0), Duration::ZERO);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SyncConfig::default();
        config.server.base_url = "127.0.0.1:5000".to_string();
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.entities.cars = IdRange::new("car_", 10, 1);
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config
            .resources
            .get_mut("car_positions")
            .unwrap()
            .interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config
            .resources
            .get_mut("traffic_light_states")
            .unwrap()
            .path = "get_traffic_light_states".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("traffic_light_states"));
    }

    #[test]
    fn test_one_shot_resource_may_have_zero_interval() {
        let mut config = SyncConfig::default();
        config
            .resources
            .get_mut("traffic_light_positions")
            .unwrap()
            .interval_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_join_url_trims_trailing_slash() {
        assert_eq!(
            join_url("http://127.0.0.1:5000/", "/get_car_positions"),
            "http://127.0.0.1:5000/get_car_positions"
        );
    }

    #[test]
    fn test_read_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbase_url = \"http://localhost:9000\"").unwrap();

        let config = read_config(file.path()).unwrap();
        assert_eq!(config.server.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_read_config_reports_path() {
        let err = read_config("/nonexistent/statesync.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/statesync.toml"));
    }
}

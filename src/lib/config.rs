//! Configuration for the reconciliation engine and the `r_fleet` binary.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};
use crate::poller::PollPolicy;
use crate::tasks::MemoryPolicy;
use crate::teardown::TeardownPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub teardown: TeardownConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Memory floor and default applied to every container, in MiB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_mib")]
    pub default_mib: u32,

    #[serde(default = "default_min_memory_mib")]
    pub min_mib: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_mib: default_memory_mib(),
            min_mib: default_min_memory_mib(),
        }
    }
}

impl MemoryConfig {
    pub fn policy(&self) -> MemoryPolicy {
        MemoryPolicy::new(self.default_mib, self.min_mib)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Delay between two observations.
    #[serde(default = "default_poll_delay")]
    pub delay_secs: u64,

    /// Upper bound on observations; `None` polls until converged.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_poll_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollerConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            delay: Duration::from_secs(self.delay_secs),
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Prefix every managed task definition family starts with.
    #[serde(default = "default_resource_prefix")]
    pub resource_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            resource_prefix: default_resource_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownConfig {
    #[serde(default)]
    pub policy: TeardownPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Simulated cluster held in process memory.
    #[default]
    Memory,
    /// Local Docker daemon.
    Docker,
}

impl std::str::FromStr for BackendKind {
    type Err = ReconcileError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "docker" => Ok(BackendKind::Docker),
            other => Err(ReconcileError::Config(format!(
                "unknown backend kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Describes a simulated service needs before it reports steady state.
    #[serde(default = "default_settle_after")]
    pub steady_after: u32,

    /// Describes a deleted simulated service needs before it turns INACTIVE.
    #[serde(default = "default_settle_after")]
    pub drain_after: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            steady_after: default_settle_after(),
            drain_after: default_settle_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_memory_mib() -> u32 {
    512
}

fn default_min_memory_mib() -> u32 {
    128
}

fn default_poll_delay() -> u64 {
    15
}

fn default_max_attempts() -> Option<u32> {
    Some(240)
}

fn default_resource_prefix() -> String {
    "fleet-".to_string()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_settle_after() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FleetConfig {
    /// Layers defaults, an optional config file and
    /// `FLEET__<SECTION>__<KEY>` variables.
    ///
    /// The double underscore after `FLEET` keeps the single-underscore
    /// variables read by the CLI (`FLEET_CONFIG`, `FLEET_BACKEND`) out of the
    /// configuration tree.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::layered(path, None)
    }

    fn layered(path: Option<&str>, env: Option<config::Map<String, String>>) -> Result<Self> {
        let defaults = config::Config::try_from(&FleetConfig::default())
            .map_err(|e| ReconcileError::Config(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FLEET")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ReconcileError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FleetConfig::default();
        assert_eq!(config.memory.default_mib, 512);
        assert_eq!(config.memory.min_mib, 128);
        assert_eq!(config.poller.delay_secs, 15);
        assert_eq!(config.poller.max_attempts, Some(240));
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.teardown.policy, TeardownPolicy::Collect);
    }

    #[test]
    fn test_poll_policy_conversion() {
        let config = PollerConfig {
            delay_secs: 3,
            max_attempts: None,
        };
        let policy = config.policy();
        assert_eq!(policy.delay, Duration::from_secs(3));
        assert_eq!(policy.max_attempts, None);
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("Docker".parse::<BackendKind>().unwrap(), BackendKind::Docker);
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("ecs".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = FleetConfig::load(None).unwrap();
        assert_eq!(config.naming.resource_prefix, "fleet-");
        assert_eq!(config.backend.steady_after, 2);
    }

    #[test]
    fn test_environment_overrides_sections() {
        let env = [
            ("FLEET__POLLER__DELAY_SECS", "3"),
            ("FLEET__TEARDOWN__POLICY", "fail_fast"),
            ("FLEET__NAMING__RESOURCE_PREFIX", "ci-"),
            ("FLEET_BACKEND", "docker"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = FleetConfig::layered(None, Some(env)).unwrap();
        assert_eq!(config.poller.delay_secs, 3);
        assert_eq!(config.teardown.policy, TeardownPolicy::FailFast);
        assert_eq!(config.naming.resource_prefix, "ci-");
        assert_eq!(config.backend.kind, BackendKind::Memory);
    }
}

//! Bootstrap configuration
//!
//! A single immutable [`BootstrapConfig`] value is loaded once (defaults,
//! then an optional TOML file, then CLI overrides) and threaded by
//! reference through every bootstrap stage.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::daemon::RestartPolicy;
use crate::error::{BootstrapError, BootstrapResult};

/// Complete bootstrap configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Discovery and convergence
    pub fleet: FleetConfig,
    /// Coordination ensemble
    pub ensemble: EnsembleSettings,
    /// HA compute daemons
    pub compute: ComputeSettings,
    /// Child process supervision
    pub supervision: SupervisionSettings,
}

/// Fleet discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Desired fleet size; non-positive or absent means the default of 3
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_size: Option<i64>,
    /// Delay between inventory polls (milliseconds)
    pub poll_interval_ms: u64,
    /// Optional upper bound on the convergence wait (seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_secs: Option<u64>,
    /// Require two consecutive identical reads after convergence
    pub confirm_stable: bool,
    /// Bound on the stability rendezvous (seconds)
    pub rendezvous_timeout_secs: u64,
    /// Instance tag holding the group name
    pub group_tag_key: String,
    /// Instance metadata service base URL
    pub metadata_endpoint: String,
    /// Inventory API base URL; derived from the region when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_endpoint: Option<String>,
    /// Lifetime requested for metadata session tokens (seconds)
    pub metadata_token_ttl_secs: u32,
    /// Per-request timeout for metadata and inventory calls (seconds)
    pub request_timeout_secs: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        FleetConfig {
            desired_size: None,
            poll_interval_ms: 10_000,
            max_wait_secs: None,
            confirm_stable: true,
            rendezvous_timeout_secs: 300,
            group_tag_key: "cluster-group".to_string(),
            metadata_endpoint: "http://169.254.169.254".to_string(),
            inventory_endpoint: None,
            metadata_token_ttl_secs: 21_600,
            request_timeout_secs: 5,
        }
    }
}

impl FleetConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }

    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_secs(self.rendezvous_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// What to do when the ensemble never reports ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Log a warning and launch the compute daemons anyway
    Proceed,
    /// Fail the bootstrap
    Abort,
}

/// Coordination ensemble settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleSettings {
    /// Basic time unit in milliseconds
    pub tick_time_ms: u32,
    /// Ticks a follower may take to connect and sync to the leader
    pub init_limit: u32,
    /// Ticks a follower may lag behind the leader
    pub sync_limit: u32,
    /// Port clients connect to
    pub client_port: u16,
    /// Port peers use to talk to the leader
    pub peer_port: u16,
    /// Port used for leader election
    pub election_port: u16,
    /// Participant data directory (holds the rank marker)
    pub data_dir: PathBuf,
    /// Location of the generated configuration file
    pub config_path: PathBuf,
    /// File receiving the participant's stdout and stderr
    pub log_path: PathBuf,
    /// Command that runs the participant in the foreground; the config path is appended
    pub command: Vec<String>,
    /// Bound on the readiness poll (seconds)
    pub readiness_timeout_secs: u64,
    /// Delay between readiness probes (milliseconds)
    pub probe_interval_ms: u64,
    /// Behaviour when the readiness poll times out
    pub on_timeout: TimeoutPolicy,
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        EnsembleSettings {
            tick_time_ms: 2000,
            init_limit: 10,
            sync_limit: 5,
            client_port: 2181,
            peer_port: 2888,
            election_port: 3888,
            data_dir: PathBuf::from("/var/lib/zookeeper"),
            config_path: PathBuf::from("/opt/zookeeper/conf/zoo.cfg"),
            log_path: PathBuf::from("/var/log/fleetboot/zookeeper.log"),
            command: vec!["zkServer.sh".to_string(), "start-foreground".to_string()],
            readiness_timeout_secs: 120,
            probe_interval_ms: 2000,
            on_timeout: TimeoutPolicy::Proceed,
        }
    }
}

impl EnsembleSettings {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

/// HA compute cluster settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeSettings {
    /// URL scheme of the master discovery string
    pub scheme: String,
    /// Port every master candidate listens on
    pub master_port: u16,
    /// Coordination namespace used for leader election state
    pub namespace: String,
    /// Environment file read by the compute daemons
    pub env_file: PathBuf,
    /// Master daemon command
    pub master_command: Vec<String>,
    /// Worker daemon command; the discovery string is appended
    pub worker_command: Vec<String>,
    /// Directory receiving daemon logs
    pub log_dir: PathBuf,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        ComputeSettings {
            scheme: "spark".to_string(),
            master_port: 7077,
            namespace: "/spark".to_string(),
            env_file: PathBuf::from("/opt/spark/conf/spark-env.sh"),
            master_command: vec!["start-master.sh".to_string()],
            worker_command: vec!["start-worker.sh".to_string()],
            log_dir: PathBuf::from("/var/log/fleetboot"),
        }
    }
}

/// Supervision settings applied to every launched daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionSettings {
    /// Time between SIGTERM and a hard kill (seconds)
    pub shutdown_grace_secs: u64,
    /// Restart policy for daemons
    pub restart: RestartPolicy,
    /// Maximum restarts allowed inside the window
    pub max_restarts: u32,
    /// Window for restart counting (seconds)
    pub restart_window_secs: u64,
}

impl Default for SupervisionSettings {
    fn default() -> Self {
        SupervisionSettings {
            shutdown_grace_secs: 10,
            restart: RestartPolicy::Transient,
            max_restarts: 3,
            restart_window_secs: 60,
        }
    }
}

impl BootstrapConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> BootstrapResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            BootstrapError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> BootstrapResult<Self> {
        let config: BootstrapConfig = toml::from_str(content)
            .map_err(|e| BootstrapError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overlaid by an optional file
    pub fn load(path: Option<&Path>) -> BootstrapResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Override the desired fleet size
    pub fn with_desired_size(mut self, desired: Option<i64>) -> Self {
        if desired.is_some() {
            self.fleet.desired_size = desired;
        }
        self
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> BootstrapResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| BootstrapError::Config(format!("Failed to serialize configuration: {}", e)))
    }

    /// Reject settings no bootstrap could work with
    pub fn validate(&self) -> BootstrapResult<()> {
        if self.fleet.poll_interval_ms == 0 {
            return Err(BootstrapError::Config("fleet.poll_interval_ms must be positive".into()));
        }
        if self.ensemble.probe_interval_ms == 0 {
            return Err(BootstrapError::Config("ensemble.probe_interval_ms must be positive".into()));
        }
        if self.fleet.group_tag_key.trim().is_empty() {
            return Err(BootstrapError::Config("fleet.group_tag_key must not be empty".into()));
        }

        let ports = [
            ("ensemble.client_port", self.ensemble.client_port),
            ("ensemble.peer_port", self.ensemble.peer_port),
            ("ensemble.election_port", self.ensemble.election_port),
            ("compute.master_port", self.compute.master_port),
        ];
        for (i, (name, port)) in ports.iter().enumerate() {
            if *port == 0 {
                return Err(BootstrapError::Config(format!("{} must be non-zero", name)));
            }
            if let Some((other, _)) = ports[..i].iter().find(|(_, p)| p == port) {
                return Err(BootstrapError::Config(format!(
                    "{} and {} share port {}",
                    other, name, port
                )));
            }
        }

        if self.ensemble.command.is_empty() {
            return Err(BootstrapError::Config("ensemble.command must not be empty".into()));
        }
        if self.compute.master_command.is_empty() || self.compute.worker_command.is_empty() {
            return Err(BootstrapError::Config("compute commands must not be empty".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BootstrapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fleet.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.ensemble.client_port, 2181);
        assert_eq!(config.compute.namespace, "/spark");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BootstrapConfig::from_toml(
            r#"
            [fleet]
            desired_size = 5
            group_tag_key = "analytics"

            [ensemble]
            on_timeout = "abort"
            "#,
        )
        .unwrap();

        assert_eq!(config.fleet.desired_size, Some(5));
        assert_eq!(config.fleet.group_tag_key, "analytics");
        assert_eq!(config.fleet.poll_interval_ms, 10_000);
        assert_eq!(config.ensemble.on_timeout, TimeoutPolicy::Abort);
        assert_eq!(config.compute.master_port, 7077);
    }

    #[test]
    fn test_duplicate_ports_rejected() {
        let err = BootstrapConfig::from_toml(
            r#"
            [compute]
            master_port = 2181
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("share port 2181"));
    }

    #[test]
    fn test_cli_override_only_when_given() {
        let config = BootstrapConfig::default().with_desired_size(Some(7));
        assert_eq!(config.fleet.desired_size, Some(7));

        let config = config.with_desired_size(None);
        assert_eq!(config.fleet.desired_size, Some(7));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BootstrapConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(BootstrapConfig::from_toml(&text).unwrap(), config);
    }
}

//! HA compute cluster
//!
//! Every node runs a master candidate and a worker. Leader election among
//! the masters is left to the compute framework, which coordinates through
//! the ensemble; this module only renders the connection strings and starts
//! the daemons.

pub mod launcher;

pub use launcher::ComputeLauncher;

use std::path::Path;
use serde::Serialize;

use crate::cluster::RankAssignment;
use crate::config::{ComputeSettings, EnsembleSettings};
use crate::ensemble::config::write_file;
use crate::error::EnsembleError;

/// Connection strings shared by every node for one assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaClusterConfig {
    /// `scheme://a1:port,a2:port,...` in rank order
    pub master_discovery: String,
    /// `a1:clientPort,a2:clientPort,...` in rank order
    pub ensemble_connection: String,
    /// Coordination namespace for leader-election state
    pub namespace: String,
    pub master_port: u16,
}

impl HaClusterConfig {
    pub fn from_assignment(
        assignment: &RankAssignment,
        ensemble: &EnsembleSettings,
        compute: &ComputeSettings,
    ) -> Self {
        let masters = assignment
            .addresses()
            .map(|a| format!("{}:{}", a, compute.master_port))
            .collect::<Vec<_>>()
            .join(",");
        let ensemble_connection = assignment
            .addresses()
            .map(|a| format!("{}:{}", a, ensemble.client_port))
            .collect::<Vec<_>>()
            .join(",");

        HaClusterConfig {
            master_discovery: format!("{}://{}", compute.scheme, masters),
            ensemble_connection,
            namespace: compute.namespace.clone(),
            master_port: compute.master_port,
        }
    }

    /// Java options enabling ensemble-backed recovery
    pub fn daemon_java_opts(&self) -> String {
        format!(
            "-Dspark.deploy.recoveryMode=ZOOKEEPER -Dspark.deploy.zookeeper.url={} -Dspark.deploy.zookeeper.dir={}",
            self.ensemble_connection, self.namespace
        )
    }

    /// Environment file body for this node
    pub fn render_env(&self, self_address: &str) -> String {
        format!(
            "# Generated by fleetboot\n\
             export SPARK_MASTER_HOST={}\n\
             export SPARK_MASTER_PORT={}\n\
             export SPARK_DAEMON_JAVA_OPTS=\"{}\"\n",
            self_address,
            self.master_port,
            self.daemon_java_opts()
        )
    }

    pub fn write_env(&self, path: &Path, self_address: &str) -> Result<(), EnsembleError> {
        write_file(path, &self.render_env(self_address))
    }
}

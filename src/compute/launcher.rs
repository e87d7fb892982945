//! Master and worker daemon launch

use std::path::Path;
use tracing::info;

use crate::config::{ComputeSettings, SupervisionSettings};
use crate::daemon::{ChildSpec, Supervisor};
use crate::error::BootstrapResult;
use super::HaClusterConfig;

pub const MASTER_NAME: &str = "compute-master";
pub const WORKER_NAME: &str = "compute-worker";

/// Starts the local master candidate and worker
#[derive(Debug, Clone, Copy)]
pub struct ComputeLauncher<'a> {
    settings: &'a ComputeSettings,
    supervision: &'a SupervisionSettings,
}

impl<'a> ComputeLauncher<'a> {
    pub fn new(settings: &'a ComputeSettings, supervision: &'a SupervisionSettings) -> Self {
        ComputeLauncher { settings, supervision }
    }

    fn with_daemon_env(&self, spec: ChildSpec, ha: &HaClusterConfig, self_address: &str) -> ChildSpec {
        // Keep the daemons in the foreground so they stay our children
        let mut spec = spec
            .env("SPARK_NO_DAEMONIZE", "true")
            .env("SPARK_MASTER_HOST", self_address)
            .env("SPARK_DAEMON_JAVA_OPTS", ha.daemon_java_opts());
        if let Some(conf_dir) = self.settings.env_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            spec = spec.env("SPARK_CONF_DIR", conf_dir.display().to_string());
        }
        spec.supervised_by(self.supervision)
    }

    pub fn master_spec(&self, ha: &HaClusterConfig, self_address: &str) -> BootstrapResult<ChildSpec> {
        let spec = ChildSpec::from_command(
            MASTER_NAME,
            &self.settings.master_command,
            log_path(&self.settings.log_dir, MASTER_NAME),
        )?;
        Ok(self.with_daemon_env(spec, ha, self_address))
    }

    /// Worker pointed at every master candidate
    pub fn worker_spec(&self, ha: &HaClusterConfig, self_address: &str) -> BootstrapResult<ChildSpec> {
        let spec = ChildSpec::from_command(
            WORKER_NAME,
            &self.settings.worker_command,
            log_path(&self.settings.log_dir, WORKER_NAME),
        )?
        .args([ha.master_discovery.clone()]);
        Ok(self.with_daemon_env(spec, ha, self_address))
    }

    /// Start master then worker; no liveness gate beyond supervision
    pub fn launch(&self, ha: &HaClusterConfig, self_address: &str, supervisor: &mut Supervisor) -> BootstrapResult<()> {
        supervisor.start(self.master_spec(ha, self_address)?)?;
        supervisor.start(self.worker_spec(ha, self_address)?)?;
        info!(masters = %ha.master_discovery, ensemble = %ha.ensemble_connection, "compute daemons started");
        Ok(())
    }
}

fn log_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{}.log", name))
}

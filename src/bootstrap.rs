//! The per-node bootstrap sequence
//!
//! discover → converge → rank → render ensemble config → start ensemble →
//! start compute daemons. Each stage only consumes what earlier stages
//! produced; nothing is fed back upstream.

use std::path::Path;
use serde::Serialize;
use tracing::info;

use crate::cluster::{ConvergenceWaiter, RankAssignment};
use crate::compute::{ComputeLauncher, HaClusterConfig};
use crate::config::BootstrapConfig;
use crate::daemon::Supervisor;
use crate::ensemble::{ConsensusLauncher, EnsembleConfig, Readiness, MARKER_FILE};
use crate::error::{BootstrapResult, EnsembleError};
use crate::ensemble::config::write_file;
use crate::fleet::{FleetInventory, FleetResolver};
use crate::types::{FleetSnapshot, NodeIdentity, RankedMember};

/// Everything derived from one converged snapshot
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapPlan {
    pub identity: NodeIdentity,
    pub snapshot: FleetSnapshot,
    pub ranks: Vec<RankedMember>,
    pub self_rank: RankedMember,
    pub ensemble: EnsembleConfig,
    pub ha: HaClusterConfig,
}

impl BootstrapPlan {
    /// Rank the snapshot and render every artifact. Pure; touches nothing.
    pub fn build(config: &BootstrapConfig, identity: NodeIdentity, snapshot: FleetSnapshot) -> BootstrapResult<Self> {
        let assignment = RankAssignment::from_snapshot(&snapshot)?;
        let self_rank = assignment.self_rank(&identity)?;
        let ensemble = EnsembleConfig::from_assignment(&assignment, &config.ensemble);
        let ha = HaClusterConfig::from_assignment(&assignment, &config.ensemble, &config.compute);

        info!(rank = self_rank.rank, members = assignment.len(), id = %identity.id, "assigned rank");

        Ok(BootstrapPlan {
            identity,
            snapshot,
            ranks: assignment.members().to_vec(),
            self_rank,
            ensemble,
            ha,
        })
    }

    /// Write artifacts to their configured locations
    pub fn write_artifacts(&self, config: &BootstrapConfig) -> BootstrapResult<()> {
        self.ensemble.write(&config.ensemble.config_path, self.self_rank.rank)?;
        self.ha.write_env(&config.compute.env_file, &self.identity.address)?;
        info!(
            config = %config.ensemble.config_path.display(),
            env = %config.compute.env_file.display(),
            "wrote ensemble and compute configuration"
        );
        Ok(())
    }

    /// Write artifacts side by side into one directory (offline rendering)
    pub fn write_to_dir(&self, dir: &Path, config: &BootstrapConfig) -> Result<(), EnsembleError> {
        let config_name = file_name_or(&config.ensemble.config_path, "zoo.cfg");
        let env_name = file_name_or(&config.compute.env_file, "spark-env.sh");

        write_file(&dir.join(config_name), &self.ensemble.render())?;
        write_file(&dir.join(MARKER_FILE), &EnsembleConfig::render_marker(self.self_rank.rank))?;
        self.ha.write_env(&dir.join(env_name), &self.identity.address)
    }
}

fn file_name_or<'a>(path: &'a Path, fallback: &'a str) -> &'a std::ffi::OsStr {
    path.file_name().unwrap_or_else(|| std::ffi::OsStr::new(fallback))
}

/// What a finished bootstrap produced
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub group: String,
    pub plan: BootstrapPlan,
    pub readiness: Readiness,
}

/// Drives the sequence for this node
#[derive(Debug, Clone, Copy)]
pub struct Bootstrap<'a> {
    config: &'a BootstrapConfig,
}

impl<'a> Bootstrap<'a> {
    pub fn new(config: &'a BootstrapConfig) -> Self {
        Bootstrap { config }
    }

    /// Resolve identity, wait for convergence, optionally confirm stability
    pub async fn discover<I: FleetInventory + 'static>(&self, inventory: I) -> BootstrapResult<(FleetResolver, FleetSnapshot)> {
        let resolver = FleetResolver::new(inventory).await?;
        let waiter = ConvergenceWaiter::from_config(&self.config.fleet);
        let convergence = waiter.wait(&resolver).await?;

        let snapshot = if self.config.fleet.confirm_stable {
            waiter
                .confirm_stable(&resolver, convergence.snapshot, self.config.fleet.rendezvous_timeout())
                .await?
        } else {
            convergence.snapshot
        };

        Ok((resolver, snapshot))
    }

    /// Run the whole sequence, leaving the daemons in `supervisor`.
    ///
    /// On error, anything already started stays in `supervisor`; the caller
    /// decides whether to shut it down.
    pub async fn run<I: FleetInventory + 'static>(
        &self,
        inventory: I,
        supervisor: &mut Supervisor,
    ) -> BootstrapResult<BootstrapReport> {
        let (resolver, snapshot) = self.discover(inventory).await?;
        let plan = BootstrapPlan::build(self.config, resolver.identity().clone(), snapshot)?;
        plan.write_artifacts(self.config)?;

        let readiness = ConsensusLauncher::new(&self.config.ensemble, &self.config.supervision)
            .launch(supervisor)
            .await?;

        ComputeLauncher::new(&self.config.compute, &self.config.supervision).launch(
            &plan.ha,
            &plan.identity.address,
            supervisor,
        )?;

        Ok(BootstrapReport {
            group: resolver.group().to_string(),
            plan,
            readiness,
        })
    }
}

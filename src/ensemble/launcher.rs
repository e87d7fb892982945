//! Local participant launch and readiness gate

use std::net::{Ipv4Addr, SocketAddr};
use tracing::{info, warn};

use crate::config::{EnsembleSettings, SupervisionSettings, TimeoutPolicy};
use crate::daemon::{ChildSpec, Supervisor};
use crate::error::{BootstrapResult, EnsembleError};
use super::probe::{self, Readiness};

/// Child name used for the participant
pub const PARTICIPANT_NAME: &str = "ensemble";

/// Starts the ensemble participant and gates on its readiness
#[derive(Debug, Clone, Copy)]
pub struct ConsensusLauncher<'a> {
    settings: &'a EnsembleSettings,
    supervision: &'a SupervisionSettings,
}

impl<'a> ConsensusLauncher<'a> {
    pub fn new(settings: &'a EnsembleSettings, supervision: &'a SupervisionSettings) -> Self {
        ConsensusLauncher { settings, supervision }
    }

    /// Child specification for the participant
    pub fn child_spec(&self) -> BootstrapResult<ChildSpec> {
        let spec = ChildSpec::from_command(PARTICIPANT_NAME, &self.settings.command, &self.settings.log_path)?
            .args([self.settings.config_path.display().to_string()])
            .supervised_by(self.supervision);
        Ok(spec)
    }

    /// Start the participant, then poll it until ready or the bound elapses.
    ///
    /// A timeout is returned as `Readiness::TimedOut` under the `proceed`
    /// policy and as an error under `abort`. A participant that exits for
    /// good while being polled is always an error.
    pub async fn launch(&self, supervisor: &mut Supervisor) -> BootstrapResult<Readiness> {
        let participant = supervisor.start(self.child_spec()?)?;
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.settings.client_port));

        let readiness = tokio::select! {
            readiness = probe::wait_until_ready(
                addr,
                self.settings.probe_interval(),
                self.settings.readiness_timeout(),
            ) => readiness,
            status = participant.wait() => {
                return Err(EnsembleError::ParticipantExited { status: format!("{:?}", status) }.into());
            }
        };

        match (&readiness, self.settings.on_timeout) {
            (Readiness::Ready { .. }, _) => {}
            (Readiness::TimedOut { elapsed, last_error }, TimeoutPolicy::Proceed) => {
                warn!(
                    ?elapsed,
                    last_error = last_error.as_deref().unwrap_or("none"),
                    "ensemble not ready, continuing with compute launch"
                );
            }
            (Readiness::TimedOut { elapsed, .. }, TimeoutPolicy::Abort) => {
                return Err(EnsembleError::NotReady {
                    waited_secs: elapsed.as_secs(),
                }
                .into());
            }
        }

        info!(ready = readiness.is_ready(), "ensemble launch finished");
        Ok(readiness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_child_spec_appends_config_path() {
        let settings = EnsembleSettings {
            config_path: PathBuf::from("/etc/zk/zoo.cfg"),
            ..EnsembleSettings::default()
        };
        let supervision = SupervisionSettings::default();
        let spec = ConsensusLauncher::new(&settings, &supervision).child_spec().unwrap();

        assert_eq!(spec.name, PARTICIPANT_NAME);
        assert_eq!(spec.program, "zkServer.sh");
        assert_eq!(spec.args, vec!["start-foreground", "/etc/zk/zoo.cfg"]);
        assert_eq!(spec.restart_policy, supervision.restart);
    }
}

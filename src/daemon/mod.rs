//! Supervised daemons
//!
//! Every long-running process the bootstrap launches (the ensemble
//! participant, the compute master and worker) runs as a child of this
//! process. Each child gets a monitor task that publishes its status,
//! applies the restart policy, and handles graceful shutdown.

pub mod process;
pub mod supervisor;

pub use process::SupervisedProcess;
pub use supervisor::{RestartState, Supervisor};

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{SupervisionError, SupervisionResult};

/// Restart policy for child processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Always restart the child
    Permanent,
    /// Restart only if child exits abnormally
    Transient,
    /// Never restart the child
    Temporary,
}

impl RestartPolicy {
    /// Whether an exit with the given normality warrants a restart
    pub fn should_restart(self, abnormal: bool) -> bool {
        match self {
            RestartPolicy::Permanent => true,
            RestartPolicy::Transient => abnormal,
            RestartPolicy::Temporary => false,
        }
    }
}

/// Observable state of a supervised child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    /// Child is running with the given OS pid
    Running { pid: u32 },
    /// Child exited and is about to be started again
    Restarting { attempt: u32 },
    /// Child exited and will not be restarted
    Exited { code: Option<i32> },
    /// Child could not be waited on or respawned
    Failed { reason: String },
    /// Child was stopped through the shutdown path
    Stopped,
}

impl ProcessStatus {
    /// True once the monitor has given up on the child
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Exited { .. } | ProcessStatus::Failed { .. } | ProcessStatus::Stopped
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running { .. })
    }
}

/// Child specification for supervision
#[derive(Debug, Clone)]
pub struct ChildSpec {
    /// Child identifier used in logs
    pub name: String,
    /// Executable
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// File receiving stdout and stderr
    pub log_path: PathBuf,
    /// Restart policy
    pub restart_policy: RestartPolicy,
    /// Shutdown timeout
    pub shutdown_timeout: Duration,
    /// Maximum restarts allowed inside `restart_window`
    pub max_restarts: u32,
    /// Time window for restart counting
    pub restart_window: Duration,
    /// Pause before a restart
    pub restart_delay: Duration,
}

impl ChildSpec {
    /// Create a new child specification
    pub fn new(name: impl Into<String>, program: impl Into<String>, log_path: impl Into<PathBuf>) -> Self {
        ChildSpec {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            log_path: log_path.into(),
            restart_policy: RestartPolicy::Temporary,
            shutdown_timeout: Duration::from_secs(10),
            max_restarts: 3,
            restart_window: Duration::from_secs(60),
            restart_delay: Duration::from_secs(1),
        }
    }

    /// Build a spec from a configured command line (program first)
    pub fn from_command(
        name: impl Into<String>,
        command: &[String],
        log_path: impl Into<PathBuf>,
    ) -> SupervisionResult<Self> {
        let name = name.into();
        let (program, args) = command
            .split_first()
            .ok_or_else(|| SupervisionError::EmptyCommand(name.clone()))?;

        Ok(ChildSpec::new(name, program.clone(), log_path).args(args.iter().cloned()))
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set restart policy
    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Set shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set restart intensity
    pub fn max_restarts(mut self, max_restarts: u32, window: Duration) -> Self {
        self.max_restarts = max_restarts;
        self.restart_window = window;
        self
    }

    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Apply the configured supervision settings
    pub fn supervised_by(self, settings: &crate::config::SupervisionSettings) -> Self {
        self.restart_policy(settings.restart)
            .shutdown_timeout(Duration::from_secs(settings.shutdown_grace_secs))
            .max_restarts(settings.max_restarts, Duration::from_secs(settings.restart_window_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_policy_decisions() {
        assert!(RestartPolicy::Permanent.should_restart(false));
        assert!(RestartPolicy::Permanent.should_restart(true));
        assert!(RestartPolicy::Transient.should_restart(true));
        assert!(!RestartPolicy::Transient.should_restart(false));
        assert!(!RestartPolicy::Temporary.should_restart(true));
    }

    #[test]
    fn test_spec_from_command() {
        let command = vec!["zkServer.sh".to_string(), "start-foreground".to_string()];
        let spec = ChildSpec::from_command("ensemble", &command, "/tmp/zk.log")
            .unwrap()
            .args(["/opt/zk/zoo.cfg"]);

        assert_eq!(spec.program, "zkServer.sh");
        assert_eq!(spec.args, vec!["start-foreground", "/opt/zk/zoo.cfg"]);
        assert_eq!(spec.restart_policy, RestartPolicy::Temporary);

        let err = ChildSpec::from_command("empty", &[], "/tmp/x.log").unwrap_err();
        assert!(matches!(err, SupervisionError::EmptyCommand(name) if name == "empty"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ProcessStatus::Stopped.is_terminal());
        assert!(ProcessStatus::Exited { code: Some(1) }.is_terminal());
        assert!(!ProcessStatus::Running { pid: 1 }.is_terminal());
        assert!(!ProcessStatus::Restarting { attempt: 1 }.is_terminal());
    }
}

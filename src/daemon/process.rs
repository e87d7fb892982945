//! A single supervised child process

use std::fs::{self, OpenOptions};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{SupervisionError, SupervisionResult};
use super::{ChildSpec, ProcessStatus, RestartState};

/// How often shutdown checks whether the process group has drained
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle to a running child and its monitor task.
///
/// Dropping the handle without calling [`SupervisedProcess::shutdown`]
/// also stops the child, because the monitor treats a closed shutdown
/// channel as a shutdown request.
#[derive(Debug)]
pub struct SupervisedProcess {
    name: String,
    status: watch::Receiver<ProcessStatus>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl SupervisedProcess {
    /// Start the child and its monitor. Must be called inside a tokio runtime.
    pub fn spawn(spec: ChildSpec) -> SupervisionResult<Self> {
        let child = spawn_child(&spec)?;
        let pid = child.id().unwrap_or_default();
        info!(name = %spec.name, pid, program = %spec.program, "started child process");

        let (status_tx, status_rx) = watch::channel(ProcessStatus::Running { pid });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let name = spec.name.clone();
        let monitor = tokio::spawn(monitor(spec, child, status_tx, shutdown_rx));

        Ok(SupervisedProcess {
            name,
            status: status_rx,
            shutdown_tx: Some(shutdown_tx),
            monitor: Some(monitor),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status
    pub fn status(&self) -> ProcessStatus {
        self.status.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.status.borrow().is_running()
    }

    /// Receiver that observes every status change
    pub fn subscribe(&self) -> watch::Receiver<ProcessStatus> {
        self.status.clone()
    }

    /// Wait until the monitor reaches a terminal status
    pub async fn wait(&self) -> ProcessStatus {
        let mut rx = self.status.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Stop the child: SIGTERM, bounded grace period, then kill
    pub async fn shutdown(&mut self) -> ProcessStatus {
        if let Some(tx) = self.shutdown_tx.take() {
            // Monitor may already have finished
            let _ = tx.send(());
        }
        if let Some(monitor) = self.monitor.take() {
            if let Err(e) = monitor.await {
                warn!(name = %self.name, error = %e, "monitor task panicked");
            }
        }
        self.status()
    }
}

fn spawn_child(spec: &ChildSpec) -> SupervisionResult<Child> {
    if let Some(parent) = spec.log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| SupervisionError::LogFile {
                path: spec.log_path.display().to_string(),
                source,
            })?;
        }
    }

    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&spec.log_path)
        .map_err(|source| SupervisionError::LogFile {
            path: spec.log_path.display().to_string(),
            source,
        })?;
    let log_err = log.try_clone().map_err(|source| SupervisionError::LogFile {
        path: spec.log_path.display().to_string(),
        source,
    })?;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));

    // Own process group, so signals reach everything the child forks
    #[cfg(unix)]
    command.process_group(0);

    command
        .spawn()
        .map_err(|source| SupervisionError::Spawn {
            name: spec.name.clone(),
            source,
        })
}

async fn monitor(
    spec: ChildSpec,
    mut child: Child,
    status_tx: watch::Sender<ProcessStatus>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut restarts = RestartState::new();

    loop {
        tokio::select! {
            result = child.wait() => {
                let code = match result {
                    Ok(exit) => exit.code(),
                    Err(e) => {
                        warn!(name = %spec.name, error = %e, "failed to wait on child");
                        status_tx.send_replace(ProcessStatus::Failed { reason: e.to_string() });
                        return;
                    }
                };

                // Killed by a signal counts as abnormal
                let abnormal = code != Some(0);
                if abnormal {
                    warn!(name = %spec.name, ?code, "child exited abnormally");
                } else {
                    info!(name = %spec.name, "child exited");
                }

                if !spec.restart_policy.should_restart(abnormal)
                    || !restarts.record(Instant::now(), spec.max_restarts, spec.restart_window)
                {
                    status_tx.send_replace(ProcessStatus::Exited { code });
                    return;
                }

                status_tx.send_replace(ProcessStatus::Restarting { attempt: restarts.restart_count });
                tokio::select! {
                    _ = tokio::time::sleep(spec.restart_delay) => {}
                    _ = &mut shutdown_rx => {
                        status_tx.send_replace(ProcessStatus::Stopped);
                        return;
                    }
                }

                match spawn_child(&spec) {
                    Ok(next) => {
                        let pid = next.id().unwrap_or_default();
                        info!(name = %spec.name, pid, attempt = restarts.restart_count, "restarted child process");
                        child = next;
                        status_tx.send_replace(ProcessStatus::Running { pid });
                    }
                    Err(e) => {
                        warn!(name = %spec.name, error = %e, "failed to restart child");
                        status_tx.send_replace(ProcessStatus::Failed { reason: e.to_string() });
                        return;
                    }
                }
            }
            _ = &mut shutdown_rx => {
                terminate(&spec, &mut child).await;
                status_tx.send_replace(ProcessStatus::Stopped);
                return;
            }
        }
    }
}

async fn terminate(spec: &ChildSpec, child: &mut Child) {
    let started = Instant::now();
    let pid = child.id();

    if let Some(pid) = pid {
        if let Err(e) = signal_group(&spec.name, pid, GroupSignal::Terminate) {
            warn!(error = %e, "falling back to kill");
            let _ = child.start_kill();
        }
    }

    let leader_exited = tokio::time::timeout(spec.shutdown_timeout, child.wait()).await.is_ok();

    // Descendants can outlive the group leader
    if let Some(pid) = pid {
        while group_alive(pid) && started.elapsed() < spec.shutdown_timeout {
            tokio::time::sleep(GROUP_POLL_INTERVAL).await;
        }
        if group_alive(pid) {
            warn!(name = %spec.name, grace = ?spec.shutdown_timeout, "process group ignored SIGTERM, killing");
            if let Err(e) = signal_group(&spec.name, pid, GroupSignal::Kill) {
                warn!(name = %spec.name, error = %e, "group kill failed");
            }
        }
    }

    if !leader_exited {
        if let Err(e) = child.kill().await {
            warn!(name = %spec.name, error = %e, "kill failed");
        }
    }
    info!(name = %spec.name, elapsed = ?started.elapsed(), "child stopped");
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(name: &str, pid: u32, signal: GroupSignal) -> SupervisionResult<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    killpg(Pid::from_raw(pid as i32), signal).map_err(|e| SupervisionError::Signal {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Whether any member of the group led by `pid` still exists
#[cfg(unix)]
fn group_alive(pid: u32) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn signal_group(name: &str, _pid: u32, _signal: GroupSignal) -> SupervisionResult<()> {
    Err(SupervisionError::Signal {
        name: name.to_string(),
        reason: "process groups are not available on this platform".to_string(),
    })
}

#[cfg(not(unix))]
fn group_alive(_pid: u32) -> bool {
    false
}

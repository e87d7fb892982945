//! Supervisor owning every daemon started on this node

use std::time::{Duration, Instant};
use tracing::info;

use crate::error::SupervisionResult;
use super::{ChildSpec, ProcessStatus, SupervisedProcess};

/// Restart bookkeeping for one child
#[derive(Debug, Clone)]
pub struct RestartState {
    /// Restart count within current window
    pub restart_count: u32,
    /// Window start time
    pub window_start: Option<Instant>,
}

impl RestartState {
    pub fn new() -> Self {
        RestartState {
            restart_count: 0,
            window_start: None,
        }
    }

    /// Record a restart attempt; false when the intensity limit is exceeded
    pub fn record(&mut self, now: Instant, max_restarts: u32, window: Duration) -> bool {
        match self.window_start {
            Some(start) if now.duration_since(start) <= window => {}
            _ => {
                self.window_start = Some(now);
                self.restart_count = 0;
            }
        }

        if self.restart_count >= max_restarts {
            return false;
        }
        self.restart_count += 1;
        true
    }
}

impl Default for RestartState {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the supervised children of this node, in start order
#[derive(Debug, Default)]
pub struct Supervisor {
    children: Vec<SupervisedProcess>,
}

impl Supervisor {
    pub fn new() -> Self {
        Supervisor { children: Vec::new() }
    }

    /// Spawn a child and take ownership of its handle
    pub fn start(&mut self, spec: ChildSpec) -> SupervisionResult<&SupervisedProcess> {
        let process = SupervisedProcess::spawn(spec)?;
        self.children.push(process);
        Ok(&self.children[self.children.len() - 1])
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Look up a child by name
    pub fn get(&self, name: &str) -> Option<&SupervisedProcess> {
        self.children.iter().find(|c| c.name() == name)
    }

    /// Name and status of every child, in start order
    pub fn statuses(&self) -> Vec<(String, ProcessStatus)> {
        self.children
            .iter()
            .map(|c| (c.name().to_string(), c.status()))
            .collect()
    }

    /// Wait until every child has reached a terminal status
    pub async fn wait_all(&self) {
        for child in &self.children {
            child.wait().await;
        }
    }

    /// Stop children in reverse start order. Handles stay owned so their
    /// final status can still be read.
    pub async fn shutdown_all(&mut self) {
        for child in self.children.iter_mut().rev() {
            let status = child.shutdown().await;
            info!(name = %child.name(), ?status, "child shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_intensity_within_window() {
        let mut state = RestartState::new();
        let start = Instant::now();
        let window = Duration::from_secs(60);

        assert!(state.record(start, 2, window));
        assert!(state.record(start + Duration::from_secs(1), 2, window));
        assert!(!state.record(start + Duration::from_secs(2), 2, window));
    }

    #[test]
    fn test_restart_window_resets() {
        let mut state = RestartState::new();
        let start = Instant::now();
        let window = Duration::from_secs(10);

        assert!(state.record(start, 1, window));
        assert!(!state.record(start + Duration::from_secs(5), 1, window));
        assert!(state.record(start + Duration::from_secs(11), 1, window));
        assert_eq!(state.restart_count, 1);
    }
}

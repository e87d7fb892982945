//! Convergence gate and stability rendezvous

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::FleetConfig;
use crate::error::{BootstrapError, BootstrapResult};
use crate::types::FleetSnapshot;
use super::SnapshotSource;

/// Fleet size used when none, zero or a negative value was requested
pub const DEFAULT_FLEET_SIZE: usize = 3;

/// Desired number of running members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetSize(usize);

impl FleetSize {
    /// Non-positive or absent requests fall back to the default
    pub fn resolve(requested: Option<i64>) -> Self {
        match requested {
            Some(n) if n > 0 => FleetSize(n as usize),
            _ => FleetSize(DEFAULT_FLEET_SIZE),
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// Outcome of a successful wait
#[derive(Debug, Clone)]
pub struct Convergence {
    /// Snapshot read on the poll that met the target
    pub snapshot: FleetSnapshot,
    /// Number of inventory reads performed
    pub polls: usize,
    pub waited: Duration,
}

/// Polls the inventory until the fleet reaches its desired size
#[derive(Debug, Clone)]
pub struct ConvergenceWaiter {
    desired: FleetSize,
    interval: Duration,
    max_wait: Option<Duration>,
}

impl ConvergenceWaiter {
    pub fn new(desired: FleetSize, interval: Duration) -> Self {
        ConvergenceWaiter {
            desired,
            interval,
            max_wait: None,
        }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        let mut waiter = Self::new(FleetSize::resolve(config.desired_size), config.poll_interval());
        waiter.max_wait = config.max_wait();
        waiter
    }

    /// Bound the wait; unbounded by default
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn desired(&self) -> FleetSize {
        self.desired
    }

    /// Return on the first poll observing at least the desired member count
    pub async fn wait<S: SnapshotSource + ?Sized>(&self, source: &S) -> BootstrapResult<Convergence> {
        let started = Instant::now();
        let desired = self.desired.get();
        let mut polls = 0;

        loop {
            let snapshot = source.snapshot().await?;
            polls += 1;
            let observed = snapshot.len();

            if observed >= desired {
                info!(observed, desired, polls, "fleet converged");
                return Ok(Convergence {
                    snapshot,
                    polls,
                    waited: started.elapsed(),
                });
            }

            if let Some(max_wait) = self.max_wait {
                if started.elapsed() + self.interval > max_wait {
                    return Err(BootstrapError::ConvergenceTimeout {
                        desired,
                        observed,
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            info!(observed, desired, "waiting for fleet to converge");
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Re-read the inventory until two consecutive reads agree on the id set.
    ///
    /// A snapshot that changed since the previous read, or dropped below the
    /// desired size, restarts the comparison from the new read.
    pub async fn confirm_stable<S: SnapshotSource + ?Sized>(
        &self,
        source: &S,
        converged: FleetSnapshot,
        timeout: Duration,
    ) -> BootstrapResult<FleetSnapshot> {
        let desired = self.desired.get();
        let started = Instant::now();

        let barrier = async {
            let mut previous = converged;
            loop {
                tokio::time::sleep(self.interval).await;
                let current = source.snapshot().await?;

                if current.len() >= desired && current.same_ids(&previous) {
                    info!(members = current.len(), "fleet membership confirmed stable");
                    return Ok::<_, BootstrapError>(current);
                }

                debug!(previous = previous.len(), current = current.len(), "fleet membership changed between reads");
                previous = current;
            }
        };

        match tokio::time::timeout(timeout, barrier).await {
            Ok(result) => result,
            Err(_) => Err(BootstrapError::RendezvousTimeout {
                waited_secs: started.elapsed().as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_size_resolution() {
        assert_eq!(FleetSize::resolve(Some(0)).get(), 3);
        assert_eq!(FleetSize::resolve(Some(-1)).get(), 3);
        assert_eq!(FleetSize::resolve(None).get(), 3);
        assert_eq!(FleetSize::resolve(Some(5)).get(), 5);
        assert_eq!(FleetSize::resolve(Some(1)).get(), 1);
    }

    #[test]
    fn test_waiter_from_config() {
        let config = FleetConfig {
            desired_size: Some(-4),
            max_wait_secs: Some(30),
            ..FleetConfig::default()
        };
        let waiter = ConvergenceWaiter::from_config(&config);
        assert_eq!(waiter.desired().get(), 3);
        assert_eq!(waiter.max_wait, Some(Duration::from_secs(30)));
        assert_eq!(waiter.interval, Duration::from_secs(10));
    }
}

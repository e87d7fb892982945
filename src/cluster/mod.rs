//! Membership agreement
//!
//! Turns repeated inventory reads into one converged snapshot and a
//! deterministic rank for every member.

pub mod convergence;
pub mod ranking;

pub use convergence::{Convergence, ConvergenceWaiter, FleetSize, DEFAULT_FLEET_SIZE};
pub use ranking::RankAssignment;

use async_trait::async_trait;

use crate::error::DiscoveryResult;
use crate::fleet::FleetResolver;
use crate::types::FleetSnapshot;

/// Anything that can be asked for the current set of running members
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self) -> DiscoveryResult<FleetSnapshot>;
}

#[async_trait]
impl SnapshotSource for FleetResolver {
    async fn snapshot(&self) -> DiscoveryResult<FleetSnapshot> {
        FleetResolver::snapshot(self).await
    }
}

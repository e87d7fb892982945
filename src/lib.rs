//! # fleetboot: self-assembling cluster bootstrap
//!
//! Each node of a homogeneous cloud fleet runs the same sequence
//! independently: discover the fleet through the cloud inventory, wait for
//! it to reach the desired size, rank the members deterministically, start
//! a quorum coordination ensemble from that ranking, and finally start an
//! HA compute master and worker that elect their leader through the
//! ensemble.

#![warn(clippy::all)]

pub mod bootstrap;
pub mod cluster;
pub mod compute;
pub mod config;
pub mod daemon;
pub mod ensemble;
pub mod error;
pub mod fleet;
pub mod types;
/// Command-line interface and argument parsing
pub mod cli;
/// Command execution
pub mod commands;

// Re-export main types
pub use bootstrap::{Bootstrap, BootstrapPlan, BootstrapReport};
pub use cluster::{ConvergenceWaiter, FleetSize, RankAssignment};
pub use config::BootstrapConfig;
pub use error::{BootstrapError, BootstrapResult, DiscoveryError, RankingError};
pub use types::{FleetMember, FleetSnapshot, NodeIdentity, RankedMember};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

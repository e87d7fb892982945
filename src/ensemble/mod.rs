//! Coordination ensemble
//!
//! Renders the participant configuration from a rank assignment, starts
//! the local participant under supervision, and waits (bounded) for it to
//! join a quorum.

pub mod config;
pub mod launcher;
pub mod probe;

pub use config::{EnsembleConfig, EnsemblePeer, MARKER_FILE};
pub use launcher::ConsensusLauncher;
pub use probe::Readiness;

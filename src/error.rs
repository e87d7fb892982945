//! Error types for fleetboot

use thiserror::Error;

/// Main error type for bootstrap operations
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Metadata or inventory failures
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Rank assignment failures
    #[error("Ranking error: {0}")]
    Ranking(#[from] RankingError),

    /// Ensemble configuration and startup failures
    #[error("Ensemble error: {0}")]
    Ensemble(#[from] EnsembleError),

    /// Child process supervision failures
    #[error("Supervision error: {0}")]
    Supervision(#[from] SupervisionError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fleet did not converge within the configured bound
    #[error("Fleet did not reach {desired} members within {waited_secs}s (last observed {observed})")]
    ConvergenceTimeout {
        desired: usize,
        observed: usize,
        waited_secs: u64,
    },

    /// Consecutive inventory reads never agreed
    #[error("Fleet membership did not stabilise within {waited_secs}s")]
    RendezvousTimeout { waited_secs: u64 },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cloud metadata and inventory errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Transport-level HTTP failure
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status
    #[error("{url} returned status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// A metadata attribute was empty or missing
    #[error("Metadata attribute {0} is empty")]
    MissingAttribute(String),

    /// No usable credentials for the inventory API
    #[error("No credentials available: {0}")]
    Credentials(String),

    /// Response body could not be interpreted
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Static snapshot file problems
    #[error("Snapshot file error: {0}")]
    Snapshot(String),
}

/// Rank assignment errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RankingError {
    /// The snapshot had no members
    #[error("Cannot rank an empty fleet snapshot")]
    EmptySnapshot,

    /// This node's id was absent from the snapshot
    #[error("Node {id} is not present in the fleet snapshot")]
    SelfNotFound { id: String },
}

/// Ensemble errors
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// Writing a generated artifact failed
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The participant never reported a serving state
    #[error("Ensemble participant not ready after {waited_secs}s")]
    NotReady { waited_secs: u64 },

    /// The participant process ended before it became ready
    #[error("Ensemble participant exited before becoming ready: {status}")]
    ParticipantExited { status: String },
}

/// Child process supervision errors
#[derive(Error, Debug)]
pub enum SupervisionError {
    /// The command could not be started
    #[error("Failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The log file could not be opened
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Empty command line in the configuration
    #[error("Empty command for {0}")]
    EmptyCommand(String),

    /// Signal delivery failed
    #[error("Failed to signal {name}: {reason}")]
    Signal { name: String, reason: String },
}

/// Result type for bootstrap operations
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Result type for discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Result type for supervision operations
pub type SupervisionResult<T> = Result<T, SupervisionError>;

//! Ensemble configuration rendering

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use serde::Serialize;

use crate::cluster::RankAssignment;
use crate::config::EnsembleSettings;
use crate::error::EnsembleError;

/// Name of the rank marker inside the data directory
pub const MARKER_FILE: &str = "myid";

/// Four-letter commands the readiness probe relies on
const FOUR_LETTER_WHITELIST: &str = "ruok,srvr";

/// One `server.N=` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsemblePeer {
    pub rank: usize,
    pub address: String,
    pub peer_port: u16,
    pub election_port: u16,
}

/// Full participant configuration, identical on every node for one assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsembleConfig {
    pub tick_time_ms: u32,
    pub init_limit: u32,
    pub sync_limit: u32,
    pub data_dir: PathBuf,
    pub client_port: u16,
    /// Peers in rank order
    pub peers: Vec<EnsemblePeer>,
}

impl EnsembleConfig {
    pub fn from_assignment(assignment: &RankAssignment, settings: &EnsembleSettings) -> Self {
        let peers = assignment
            .members()
            .iter()
            .map(|m| EnsemblePeer {
                rank: m.rank,
                address: m.address.clone(),
                peer_port: settings.peer_port,
                election_port: settings.election_port,
            })
            .collect();

        EnsembleConfig {
            tick_time_ms: settings.tick_time_ms,
            init_limit: settings.init_limit,
            sync_limit: settings.sync_limit,
            data_dir: settings.data_dir.clone(),
            client_port: settings.client_port,
            peers,
        }
    }

    /// Render the configuration file body
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = writeln!(out, "tickTime={}", self.tick_time_ms);
        let _ = writeln!(out, "initLimit={}", self.init_limit);
        let _ = writeln!(out, "syncLimit={}", self.sync_limit);
        let _ = writeln!(out, "dataDir={}", self.data_dir.display());
        let _ = writeln!(out, "clientPort={}", self.client_port);
        let _ = writeln!(out, "4lw.commands.whitelist={}", FOUR_LETTER_WHITELIST);
        for peer in &self.peers {
            let _ = writeln!(
                out,
                "server.{}={}:{}:{}",
                peer.rank, peer.address, peer.peer_port, peer.election_port
            );
        }
        out
    }

    /// Body of the per-node rank marker
    pub fn render_marker(self_rank: usize) -> String {
        format!("{}\n", self_rank)
    }

    /// Write the configuration file and the rank marker under `data_dir`
    pub fn write(&self, config_path: &Path, self_rank: usize) -> Result<(), EnsembleError> {
        write_file(config_path, &self.render())?;
        write_file(&self.data_dir.join(MARKER_FILE), &Self::render_marker(self_rank))
    }
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<(), EnsembleError> {
    let to_error = |source| EnsembleError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(to_error)?;
        }
    }
    fs::write(path, content).map_err(to_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FleetMember, FleetSnapshot};

    fn assignment() -> RankAssignment {
        RankAssignment::from_snapshot(&FleetSnapshot::from_members(vec![
            FleetMember::new("i-b", "10.0.0.2"),
            FleetMember::new("i-a", "10.0.0.1"),
            FleetMember::new("i-c", "10.0.0.3"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_render_layout() {
        let config = EnsembleConfig::from_assignment(&assignment(), &EnsembleSettings::default());
        let expected = "\
tickTime=2000
initLimit=10
syncLimit=5
dataDir=/var/lib/zookeeper
clientPort=2181
4lw.commands.whitelist=ruok,srvr
server.1=10.0.0.1:2888:3888
server.2=10.0.0.2:2888:3888
server.3=10.0.0.3:2888:3888
";
        assert_eq!(config.render(), expected);
    }

    #[test]
    fn test_write_config_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EnsembleSettings {
            data_dir: dir.path().join("data"),
            ..EnsembleSettings::default()
        };
        let config = EnsembleConfig::from_assignment(&assignment(), &settings);
        let config_path = dir.path().join("conf").join("zoo.cfg");

        config.write(&config_path, 2).unwrap();

        assert_eq!(fs::read_to_string(&config_path).unwrap(), config.render());
        assert_eq!(fs::read_to_string(dir.path().join("data").join(MARKER_FILE)).unwrap(), "2\n");
    }
}

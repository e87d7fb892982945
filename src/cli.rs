use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fleetboot - self-assembling bootstrap for an ensemble-backed HA compute cluster
#[derive(Parser)]
#[command(name = "fleetboot")]
#[command(author = "Fleetboot Team")]
#[command(version)]
#[command(about = "Discover the fleet, agree on ranks, start the coordination ensemble and HA compute daemons")]
#[command(long_about = "
fleetboot runs on every node of a homogeneous fleet. Each node independently:
- resolves its identity and group from instance metadata
- waits until the group has the desired number of running members
- ranks the members by id and writes the ensemble configuration
- starts the ensemble participant and waits for it to join a quorum
- starts a compute master candidate and a worker

Usage examples:
  fleetboot bootstrap --desired-size 5
  fleetboot resolve
  fleetboot render --snapshot fleet.json --self-id i-0abc --out ./rendered
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the full bootstrap and supervise the started daemons
    Bootstrap {
        /// Desired fleet size; zero or negative means 3
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        desired_size: Option<i64>,
    },

    /// Print this node's identity and the current group inventory as JSON
    Resolve,

    /// Render all artifacts from a JSON snapshot without starting anything
    Render {
        /// JSON array of {"id", "address"} members
        #[arg(short, long, value_name = "FILE")]
        snapshot: PathBuf,

        /// Id of the node to render for
        #[arg(long)]
        self_id: String,

        /// Output directory
        #[arg(short, long, default_value = "rendered")]
        out: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::FleetSize;

    fn desired_size_of(args: &[&str]) -> Option<i64> {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Bootstrap { desired_size } => desired_size,
            _ => panic!("Expected Bootstrap command"),
        }
    }

    #[test]
    fn test_bootstrap_desired_size() {
        assert_eq!(desired_size_of(&["fleetboot", "bootstrap"]), None);
        assert_eq!(desired_size_of(&["fleetboot", "bootstrap", "--desired-size", "5"]), Some(5));
        assert_eq!(desired_size_of(&["fleetboot", "bootstrap", "-n", "0"]), Some(0));
    }

    #[test]
    fn test_negative_desired_size_falls_back_to_default() {
        let short = desired_size_of(&["fleetboot", "bootstrap", "-n", "-1"]);
        assert_eq!(short, Some(-1));
        assert_eq!(FleetSize::resolve(short).get(), 3);

        let long = desired_size_of(&["fleetboot", "bootstrap", "--desired-size", "-7"]);
        assert_eq!(FleetSize::resolve(long).get(), 3);
    }

    #[test]
    fn test_render_and_global_flags() {
        let cli = Cli::try_parse_from([
            "fleetboot", "--verbose", "-c", "node.toml", "render", "-s", "fleet.json", "--self-id", "i-0a1",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("node.toml")));
        match cli.command {
            Commands::Render { snapshot, self_id, out } => {
                assert_eq!(snapshot, PathBuf::from("fleet.json"));
                assert_eq!(self_id, "i-0a1");
                assert_eq!(out, PathBuf::from("rendered"));
            }
            _ => panic!("Expected Render command"),
        }
    }
}

use clap::Parser;
use colored::*;
use fleetboot::cli::Cli;
use fleetboot::commands::execute_command;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Set up colored output
    if cli.no_color {
        colored::control::set_override(false);
    }

    let default_filter = if cli.verbose { "info,fleetboot=debug" } else { "warn,fleetboot=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_target(false)
        .init();

    // Handle the command
    if let Err(e) = execute_command(cli.command, cli.config).await {
        eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
        process::exit(1);
    }
}

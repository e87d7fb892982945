use anyhow::Context;
use colored::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::bootstrap::{Bootstrap, BootstrapPlan, BootstrapReport};
use crate::cli::Commands;
use crate::config::BootstrapConfig;
use crate::daemon::Supervisor;
use crate::ensemble::Readiness;
use crate::fleet::{Ec2Inventory, FleetInventory, FleetResolver, StaticInventory};

pub async fn execute_command(command: Commands, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = BootstrapConfig::load(config_path.as_deref())
        .with_context(|| match &config_path {
            Some(path) => format!("loading {}", path.display()),
            None => "building default configuration".to_string(),
        })?;

    match command {
        Commands::Bootstrap { desired_size } => {
            let config = config.with_desired_size(desired_size);
            config.validate()?;
            execute_bootstrap(config).await
        }
        Commands::Resolve => execute_resolve(config).await,
        Commands::Render { snapshot, self_id, out } => {
            execute_render(config, &snapshot, &self_id, &out).await
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn execute_bootstrap(config: BootstrapConfig) -> anyhow::Result<()> {
    let inventory = Ec2Inventory::new(&config.fleet).context("creating inventory client")?;
    let mut supervisor = Supervisor::new();

    let report = match Bootstrap::new(&config).run(inventory, &mut supervisor).await {
        Ok(report) => report,
        Err(e) => {
            // Nothing started on this node should outlive a failed bootstrap
            supervisor.shutdown_all().await;
            return Err(e).context("bootstrap failed");
        }
    };
    print_report(&report);

    tokio::select! {
        _ = shutdown_signal() => info!("shutdown requested"),
        _ = supervisor.wait_all() => warn!("every supervised daemon has exited"),
    }

    for (name, status) in supervisor.statuses() {
        info!(%name, ?status, "final daemon status");
    }
    supervisor.shutdown_all().await;
    Ok(())
}

async fn execute_resolve(config: BootstrapConfig) -> anyhow::Result<()> {
    let inventory = Ec2Inventory::new(&config.fleet).context("creating inventory client")?;
    let resolver = FleetResolver::new(inventory).await.context("resolving node identity")?;
    let snapshot = resolver.snapshot().await.context("reading fleet inventory")?;

    let document = serde_json::json!({
        "identity": resolver.identity(),
        "group": resolver.group(),
        "members": snapshot,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn execute_render(config: BootstrapConfig, snapshot: &Path, self_id: &str, out: &Path) -> anyhow::Result<()> {
    let inventory = StaticInventory::from_snapshot_file(snapshot, self_id)?;
    let identity = inventory.identity().await?;
    let members = inventory.running_members(&inventory.group_name().await?).await?;

    let plan = BootstrapPlan::build(&config, identity, members)?;
    plan.write_to_dir(out, &config)
        .with_context(|| format!("writing artifacts to {}", out.display()))?;

    println!("{} {}", "Rendered:".bright_green(), out.display());
    println!("  {} {} of {}", "rank".bright_blue(), plan.self_rank.rank, plan.ranks.len());
    println!("  {} {}", "masters".bright_blue(), plan.ha.master_discovery);
    println!("  {} {}", "ensemble".bright_blue(), plan.ha.ensemble_connection);
    Ok(())
}

fn print_report(report: &BootstrapReport) {
    let plan = &report.plan;
    println!("{}", "Bootstrap complete".bright_green().bold());
    println!("  {} {}", "group".bright_blue(), report.group);
    println!("  {} {} ({})", "node".bright_blue(), plan.identity.id, plan.identity.address);
    println!("  {} {} of {}", "rank".bright_blue(), plan.self_rank.rank, plan.ranks.len());
    println!("  {} {}", "masters".bright_blue(), plan.ha.master_discovery);
    println!("  {} {}{}", "ensemble".bright_blue(), plan.ha.ensemble_connection, plan.ha.namespace);
    match &report.readiness {
        Readiness::Ready { mode, elapsed } => {
            println!("  {} {} after {:?}", "quorum".bright_blue(), mode, elapsed)
        }
        Readiness::TimedOut { elapsed, .. } => {
            println!("  {} {} after {:?}", "quorum".bright_blue(), "not confirmed".yellow(), elapsed)
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, waiting for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

use anyhow::{bail, Context, Result};
use boulder::clients::{IdentityClient, PlatformClient};
use boulder::config::BoulderConfig;
use boulder::lifecycle::{
    Dispatcher, LifecycleExecutor, LifecyclePolicy, PassPlan, Reconciler, Remotes, Scheduler,
    SystemClock, Verdict,
};
use boulder::observability::{OperationTimer, ReconcileMetrics};
use boulder::roster::{seed_roster_file, Roster};
use boulder::shutdown::ShutdownCoordinator;
use boulder::telemetry::{init_telemetry, shutdown_telemetry};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "boulder")]
#[command(version)]
#[command(about = "Roster-driven account, organization and workspace lifecycle reconciler")]
#[command(long_about = "Boulder keeps identity accounts and platform organizations/workspaces in step \
                       with a roster of time-bounded entries: it provisions them when an entry's start \
                       date arrives and tears them down once the retention window has passed.")]
struct Cli {
    /// Configuration file (defaults to ./boulder.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile continuously until interrupted (first pass runs immediately)
    Run,
    /// Run a single reconciliation pass, wait for its actions, then exit
    Reconcile,
    /// Show each roster entry's lifecycle state and intended action without changing anything
    Plan,
    /// Roster file helpers
    Roster {
        #[command(subcommand)]
        command: RosterCommands,
    },
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum RosterCommands {
    /// Append randomly generated entries starting now (development resets)
    Seed {
        /// Number of entries to add
        count: usize,
        /// Roster file to write (defaults to lifecycle.roster_file)
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration with secrets redacted
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let env_file_loaded = BoulderConfig::load_env_file()?;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Config {
            command: ConfigCommands::Show,
        } => {
            print!("{}", config.redacted().to_toml()?);
            Ok(())
        }
        Commands::Roster {
            command: RosterCommands::Seed { count, file },
        } => {
            let path = file.unwrap_or_else(|| config.lifecycle.roster_file.clone());
            let total = seed_roster_file(&path, count, Utc::now())
                .with_context(|| format!("failed to seed roster {}", path.display()))?;
            println!("Added {} entries to {} ({} total)", count, path.display(), total);
            Ok(())
        }
        Commands::Plan => {
            start_telemetry(&config, env_file_loaded)?;
            tokio::runtime::Runtime::new()?.block_on(async { plan_command(&config).await })
        }
        Commands::Reconcile => {
            start_telemetry(&config, env_file_loaded)?;
            tokio::runtime::Runtime::new()?.block_on(async { reconcile_command(&config).await })
        }
        Commands::Run => {
            start_telemetry(&config, env_file_loaded)?;
            tokio::runtime::Runtime::new()?.block_on(async { run_command(&config).await })
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<BoulderConfig> {
    let config = BoulderConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

fn start_telemetry(config: &BoulderConfig, env_file_loaded: bool) -> Result<()> {
    init_telemetry(&config.observability)?;
    if env_file_loaded {
        info!("Loaded environment variables from .env file");
    }
    Ok(())
}

fn build_remotes(config: &BoulderConfig) -> Result<Remotes> {
    let identity = IdentityClient::new(&config.identity, &config.http)
        .context("failed to construct identity client")?;
    let platform = PlatformClient::new(&config.platform, &config.http)
        .context("failed to construct platform client")?;
    Ok(Remotes::new(Arc::new(identity), Arc::new(platform)))
}

fn load_roster(config: &BoulderConfig) -> Result<Arc<Roster>> {
    let path = &config.lifecycle.roster_file;
    let roster = Roster::load(path).with_context(|| format!("failed to load roster {}", path.display()))?;
    info!(
        path = %path.display(),
        entries = roster.len(),
        managed = roster.managed().count(),
        "Roster loaded"
    );
    Ok(Arc::new(roster))
}

fn build_scheduler(config: &BoulderConfig, metrics: Arc<ReconcileMetrics>) -> Result<Scheduler> {
    let policy = LifecyclePolicy::from_config(&config.lifecycle)?;
    let roster = load_roster(config)?;
    let remotes = build_remotes(config)?;

    let reconciler = Reconciler::new(remotes.clone(), Arc::new(SystemClock), policy);
    let executor = LifecycleExecutor::new(remotes, config.lifecycle.baseline_password.clone());
    let dispatcher = Dispatcher::new(Arc::new(executor), config.workers.concurrency, metrics.clone());

    Ok(Scheduler::new(
        Arc::new(reconciler),
        dispatcher,
        roster,
        config.lifecycle.poll_interval(),
        metrics,
    ))
}

async fn run_command(config: &BoulderConfig) -> Result<()> {
    config.validate_provisioning()?;
    let metrics = Arc::new(ReconcileMetrics::new());
    let scheduler = build_scheduler(config, metrics.clone())?;

    let coordinator = Arc::new(ShutdownCoordinator::new());
    let shutdown = coordinator.subscribe();
    let signals = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if let Err(e) = coordinator.wait_for_shutdown().await {
                error!(error = %e, "Signal handling failed, shutting down");
                coordinator.trigger();
            }
        })
    };

    scheduler.run(shutdown).await;
    signals.abort();

    ShutdownCoordinator::shutdown_all_services(
        scheduler.dispatcher(),
        &metrics,
        Duration::from_secs(config.workers.drain_timeout_seconds),
    )
    .await;
    shutdown_telemetry();
    Ok(())
}

async fn reconcile_command(config: &BoulderConfig) -> Result<()> {
    config.validate_provisioning()?;
    let metrics = Arc::new(ReconcileMetrics::new());
    let scheduler = build_scheduler(config, metrics.clone())?;

    let summary = scheduler.run_pass().await.context("reconciliation pass failed")?;
    let drained = ShutdownCoordinator::shutdown_all_services(
        scheduler.dispatcher(),
        &metrics,
        Duration::from_secs(config.workers.drain_timeout_seconds),
    )
    .await;
    shutdown_telemetry();

    if !drained {
        bail!("{} action(s) still running after the drain timeout", scheduler.dispatcher().in_flight());
    }
    let failed = metrics.get_stats().actions_failed;
    if failed > 0 {
        warn!(failed, dispatched = summary.dispatched, "Some actions failed and will be retried on the next pass");
    }
    Ok(())
}

async fn plan_command(config: &BoulderConfig) -> Result<()> {
    config.validate_remote()?;
    let timer = OperationTimer::new("plan");
    let policy = LifecyclePolicy::from_config(&config.lifecycle)?;
    let roster = load_roster(config)?;
    let reconciler = Reconciler::new(build_remotes(config)?, Arc::new(SystemClock), policy);

    let plan = reconciler.plan_pass(&roster).await.context("classification failed")?;
    print_plan(&plan);
    timer.finish();
    Ok(())
}

fn print_plan(plan: &PassPlan) {
    println!("Lifecycle plan at {}", plan.now.to_rfc3339());
    println!("{:<24} {:<16} ACTION", "SLUG", "STATE");
    for entry in &plan.entries {
        let slug = entry.entry.slug();
        match &entry.verdict {
            Verdict::State(state) => {
                let action = entry.action().map(|a| a.as_str()).unwrap_or("-");
                println!("{:<24} {:<16} {}", slug, state, action);
            }
            Verdict::SkippedMalformed => println!("{:<24} {:<16} -", slug, "skipped"),
            Verdict::Unresolved(e) => println!("{:<24} {:<16} - ({})", slug, "unresolved", e),
        }
    }
}

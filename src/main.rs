//! # Scout Cron — periodic work-queue drainer
//!
//! Sweeps stalled sessions, scheduled chats, blocked owner queues, and due
//! automations, then hands each due item to its processing handler.
//!
//! Usage:
//!   scout-cron serve                     # Serve GET /api/internal/cron/daily
//!   scout-cron run                       # Run one sweep now and print the report
//!   scout-cron init-db                   # Create the SQLite schema and exit
//!   scout-cron --config ./scout.toml run # Explicit config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scout_core::ScoutConfig;
use scout_gateway::AppState;
use scout_scheduler::{
    Collaborators, CronOrchestrator, DrainRoutines, InternalClient, SchedulerDb, sink_from_config,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "scout-cron",
    version,
    about = "⏰ Scout Cron — periodic work-queue drainer"
)]
struct Cli {
    /// Config file (default: $SCOUT_CONFIG or ~/.scout/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the trigger endpoint (default)
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one sweep in-process and print the report as JSON
    Run,
    /// Create the database schema and exit
    InitDb,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "scout_cron=debug,scout_scheduler=debug,scout_gateway=debug,tower_http=debug"
    } else {
        "scout_cron=info,scout_scheduler=info,scout_gateway=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(config: &ScoutConfig) -> Result<Arc<SchedulerDb>> {
    let path = config.database.expanded_path();
    let db = SchedulerDb::open(&path)
        .with_context(|| format!("opening database {}", path.display()))?
        .with_stalled_after(config.database.stalled_after_secs)
        .with_rate_limit(config.rate_limit.clone());
    tracing::info!("💾 Database ready: {}", path.display());
    Ok(Arc::new(db))
}

fn build_orchestrator(config: &ScoutConfig) -> Result<Arc<CronOrchestrator>> {
    let store = open_store(config)?;
    let client = Arc::new(InternalClient::new(&config.internal));
    if config.internal.shared_secret.is_empty() {
        tracing::warn!("⚠️ INTERNAL_SHARED_SECRET is empty: internal handlers may reject dispatches");
    }

    let deps = Collaborators {
        source: store.clone(),
        rate_limiter: store.clone(),
        hibernator: client.clone(),
        dispatcher: client,
        automations: store,
        events: sink_from_config(&config.analytics),
    };
    let routines = DrainRoutines::new(deps, config.drain.clone());
    Ok(Arc::new(CronOrchestrator::new(routines)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config_path = cli.config.as_deref().map(expand_path);
    let mut config = ScoutConfig::load(config_path.as_deref()).context("loading config")?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            tracing::info!(
                "⏰ Scout Cron starting ({:?}, {} ms between batches)",
                config.environment,
                config.drain.inter_batch_delay_ms
            );
            let orchestrator = build_orchestrator(&config)?;
            let state = AppState::new(config.environment, config.cron.secret.clone(), orchestrator);
            scout_gateway::start(&config.gateway, state).await?;
        }
        Command::Run => {
            let orchestrator = build_orchestrator(&config)?;
            match orchestrator.run().await {
                Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                Err(failure) => {
                    println!("{}", serde_json::to_string_pretty(&failure)?);
                    anyhow::bail!("sweep failed: {failure}");
                }
            }
        }
        Command::InitDb => {
            open_store(&config)?;
            println!("✅ Schema ready at {}", config.database.expanded_path().display());
        }
    }

    Ok(())
}

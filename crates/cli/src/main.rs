use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use surge_trade_core::{CatalogEntry, Clock, ConfigLoader, SystemClock};
use surge_trade_engine::{Collaborators, FileSnapshotStore, StrategyEngine};
use surge_trade_paper::{NullSubscriber, PaperGateway, PaperMarket};
use surge_trade_scheduler::TaskScheduler;

#[derive(Parser)]
#[command(name = "surge-trade")]
#[command(about = "Momentum surge trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine in paper mode against a seeded universe
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Surge.toml")]
        config: String,
        /// Universe file: catalog entries with their daily opens
        #[arg(short, long, default_value = "config/universe.json")]
        universe: String,
    },
    /// Validate a config file and print the monitored profiles
    CheckConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Surge.toml")]
        config: String,
    },
}

/// One seeded instrument for paper runs.
#[derive(Debug, Deserialize)]
struct UniverseEntry {
    #[serde(flatten)]
    catalog: CatalogEntry,
    /// Daily opening price served to baseline fetches.
    open: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, universe } => run_paper(&config, &universe).await?,
        Commands::CheckConfig { config } => check_config(&config)?,
    }

    Ok(())
}

fn load_universe(path: &str) -> Result<Vec<UniverseEntry>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {path}"))
}

async fn run_paper(config_path: &str, universe_path: &str) -> Result<()> {
    let config = ConfigLoader::load(Path::new(config_path))?;
    let universe = load_universe(universe_path)?;

    let mut market = PaperMarket::new();
    for entry in universe {
        market.add(entry.catalog, entry.open);
    }
    let market = Arc::new(market);

    let clock = Arc::new(SystemClock) as Arc<dyn Clock>;
    let scheduler = Arc::new(TaskScheduler::new(Arc::clone(&clock)));
    let store = Arc::new(FileSnapshotStore::new(config.snapshot_dir.clone()));

    let engine = Arc::new(
        StrategyEngine::new(
            config,
            scheduler,
            clock,
            Collaborators {
                gateway: Arc::new(PaperGateway::new()),
                catalog: Arc::clone(&market) as _,
                history: market as _,
                subscriber: Arc::new(NullSubscriber),
                store,
            },
        )
        .context("engine construction failed")?,
    );

    engine.start().await?;
    tracing::info!("running in paper mode, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    engine.stop().await?;
    Ok(())
}

fn check_config(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load(Path::new(config_path))?;
    println!("config ok: {} profiles", config.profiles.len());
    for profile in &config.profiles {
        println!(
            "  {} quote={} budget={} entry={}..{} exit={} wait={}s",
            profile.name,
            profile.quote_currency,
            profile.fee_budget,
            profile.entry_threshold,
            profile.entry_ceiling,
            profile.exit_threshold,
            profile.wait_time_secs
        );
    }
    Ok(())
}

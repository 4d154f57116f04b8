//! restock watcher CLI
//!
//! Long-running watch loop plus one-shot maintenance commands.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use restock::{
    classify::StockClassifier,
    engine::{self, SweepEngine},
    error::Result,
    fetch::PageFetcher,
    models::Config,
    notify::LogSink,
    storage::JsonStore,
};
use tokio::sync::mpsc;

/// restock - product page stock watcher
#[derive(Parser, Debug)]
#[command(
    name = "restock",
    version,
    about = "Watches product pages and alerts when stock state changes"
)]

struct Cli {
    /// Path to storage directory containing config and item state
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every active item on the configured interval until killed
    Watch,

    /// Run a single sweep now
    Check,

    /// Show last sweep time and per-item stock state
    Status,

    /// Track exactly the given item ids, deactivating all others
    Track {
        /// Item ids to keep active
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Validate configuration files
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Wire the engine together from configuration.
fn build_engine(config: &Config, storage_dir: &Path) -> Result<SweepEngine> {
    let classifier = StockClassifier::from_config(&config.classifier)?;
    let fetcher = PageFetcher::new(&config.watcher)?;
    let store = JsonStore::new(storage_dir, config.catalog.clone());

    Ok(SweepEngine::new(
        config.watcher.clone(),
        Arc::new(fetcher),
        classifier,
        Arc::new(store),
        Arc::new(LogSink),
    ))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("restock watcher starting...");

    // Load configuration
    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    config.validate()?;

    match cli.command {
        Command::Watch => {
            let engine = Arc::new(build_engine(&config, &cli.storage_dir)?);
            let interval = Duration::from_secs(config.watcher.sweep_interval_secs);

            let (tx, rx) = mpsc::channel(8);
            let timer = engine::spawn_timer(tx, interval);

            log::info!(
                "Watching {} catalog items every {}s (base: {})",
                config.catalog.len(),
                config.watcher.sweep_interval_secs,
                config.watcher.base_url
            );

            engine::run_trigger_loop(engine, rx).await?;
            timer.abort();
        }

        Command::Check => {
            let engine = build_engine(&config, &cli.storage_dir)?;
            let events = engine.run_sweep().await?;

            if events.is_empty() {
                log::info!("No stock changes detected");
            }
            for event in &events {
                log::info!(
                    "{}",
                    event.format("{id}: {previous} -> {current}")
                );
            }
        }

        Command::Status => {
            let engine = build_engine(&config, &cli.storage_dir)?;
            let status = engine.status().await?;

            match status.last_sweep_at {
                Some(at) => log::info!("Last sweep: {}", at.format("%Y-%m-%d %H:%M:%S")),
                None => log::info!("No sweep has run in this process yet"),
            }
            for item in &status.items {
                log::info!(
                    "{}: {}{}",
                    item.id,
                    if item.in_stock { "in stock" } else { "out of stock" },
                    if item.active { "" } else { " (inactive)" }
                );
            }
        }

        Command::Track { ids } => {
            let engine = build_engine(&config, &cli.storage_dir)?;
            let ids: HashSet<String> = ids.into_iter().collect();
            let items = engine.set_active(&ids).await?;
            for item in &items {
                log::info!(
                    "{}: {}",
                    item.id,
                    if item.active { "active" } else { "inactive" }
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            // Also compile the rule chain so selector typos surface here.
            StockClassifier::from_config(&config.classifier)?;

            log::info!(
                "✓ Config OK ({} catalog items, {} classifier rules)",
                config.catalog.len(),
                config.classifier.rules.len()
            );
        }
    }

    log::info!("Done!");

    Ok(())
}

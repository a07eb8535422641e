//! offerwatch CLI
//!
//! Local entry point: runs the watch loop, a single scan, or inspects the
//! cache state.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use offerwatch::{
    cache::DedupCache,
    error::Result,
    extract,
    models::Config,
    notify::DiscordNotifier,
    pipeline::{Orchestrator, run_scheduler},
    storage::JsonFileStore,
};

/// offerwatch - Game offer watcher
#[derive(Parser, Debug)]
#[command(
    name = "offerwatch",
    version,
    about = "Watches gaming platforms for new time-limited offers"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "offerwatch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch all sources on the configured interval
    Run,

    /// Run a single scan immediately and exit
    Once,

    /// Show per-source cache size and last run time
    Status,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK ({} sources)", config.sources.len());
        }

        Command::Status => {
            let store = Arc::new(JsonFileStore::new(&config.cache.file));
            let cache = DedupCache::load(store, config.cache.retention).await;

            for source in &config.sources {
                let last_run = cache
                    .last_run(&source.key)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "never".to_string());
                log::info!(
                    "{} ({}): {} offers cached, last run {}{}",
                    source.name,
                    source.key,
                    cache.len(&source.key),
                    last_run,
                    if source.enabled { "" } else { " [disabled]" }
                );
            }
        }

        Command::Once => {
            let orchestrator = build_orchestrator(&config).await?;
            let summary = orchestrator.run_tick().await;
            log::info!(
                "Scan complete: {} new offers, {} duplicates skipped",
                summary.new_offers(),
                summary.duplicates()
            );
        }

        Command::Run => {
            let orchestrator = Arc::new(build_orchestrator(&config).await?);
            log::info!(
                "Watching {} sources every {}s",
                config.enabled_sources().count(),
                config.scheduler.interval_secs
            );

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let scheduler = tokio::spawn(run_scheduler(
                Arc::clone(&orchestrator),
                config.scheduler.interval_secs,
                shutdown_rx,
            ));

            tokio::signal::ctrl_c().await?;
            log::info!("Ctrl-C received, letting the current run finish...");
            let _ = shutdown_tx.send(true);
            let _ = scheduler.await;
        }
    }

    log::info!("Done!");
    Ok(())
}

/// Wire the pipeline together from configuration.
async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    config.validate()?;

    let store = Arc::new(JsonFileStore::new(&config.cache.file));
    let cache = DedupCache::load(store, config.cache.retention).await;
    let sources = extract::build_sources(config)?;
    let notifier = Arc::new(DiscordNotifier::from_config(config)?);

    Ok(Orchestrator::new(sources, cache, notifier, config))
}

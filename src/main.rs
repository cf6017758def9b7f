// ABOUTME: CLI entry point for table-syncer
// ABOUTME: Parses arguments, loads configuration and runs the sync

use anyhow::Context;
use clap::Parser;
use std::path::Path;

use table_syncer::config::RootConfig;
use table_syncer::sync::engine::SyncContext;
use table_syncer::{db, orchestrator};

#[derive(Parser)]
#[command(name = "table-syncer")]
#[command(about = "Synchronize CSV/JSON files into PostgreSQL tables", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the sync configuration file
    #[arg(long, default_value = "sync.toml")]
    config: String,
    /// Compute and print the execution plan, then roll back without writing
    #[arg(long)]
    dry_run: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // Diagnostics go to stderr; stdout is reserved for dry-run plans.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = RootConfig::load(Path::new(&cli.config))
        .with_context(|| format!("Failed to load configuration from '{}'", cli.config))?;
    if cli.dry_run {
        config.dry_run = true;
    }

    tracing::info!("Target database: {}", db::sanitize_endpoint(&config.db));
    if config.dry_run {
        tracing::info!("Dry run: no changes will be committed");
    }

    let ctx = SyncContext::new(config.dry_run);
    let plans = orchestrator::run(&config, &ctx).await?;

    if config.dry_run {
        for plan in &plans {
            println!("{}", plan);
        }
    } else {
        for plan in &plans {
            tracing::info!(
                "Table '{}': {} inserted, {} updated, {} deleted",
                plan.table,
                plan.insert_count(),
                plan.update_count(),
                plan.delete_count()
            );
        }
    }

    Ok(())
}

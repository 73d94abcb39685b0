//! Catalog Watch CLI
//!
//! Local execution entry point: manual checks, a periodic watch loop and
//! offline comparisons.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use catalog_watch::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, PartitionDiff, Schedule, SessionState, Watcher},
    services::LogNotifier,
    storage::{LocalStore, RecordStore},
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// Catalog Watch - incremental catalog change detection
#[derive(Parser, Debug)]
#[command(
    name = "catalog-watch",
    version,
    about = "Detects new listings in a paginated online catalog"
)]
struct Cli {
    /// Path to storage directory containing config.toml and records.json
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
    /// Run one check now (Ctrl-C cancels)
    Check {
        /// Logical caller; one check per caller runs at a time
        #[arg(long, default_value = "cli")]
        caller: String,

        /// Where notifications go (default: the caller)
        #[arg(long)]
        destination: Option<String>,

        /// Compare against this partition (e.g. 2026-02-01) instead of recent records
        #[arg(long)]
        partition: Option<String>,
    },

    /// Run checks periodically until interrupted
    Watch {
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,

        #[arg(long, default_value = "cli")]
        caller: String,

        #[arg(long)]
        destination: Option<String>,

        /// Stop after this many checks
        #[arg(long)]
        max_runs: Option<usize>,
    },

    /// Compare two stored partitions
    Compare {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Also write the added records to this JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare two exported JSON snapshots
    CompareFiles {
        previous: PathBuf,
        current: PathBuf,

        /// Also write the added records to this JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Export stored records as a JSON array
    Export {
        /// Output file
        output: PathBuf,

        /// Only records of this partition
        #[arg(long)]
        partition: Option<String>,
    },

    /// Validate configuration file
    Validate,

    /// Show store info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping...");
            token.cancel();
        }
    });
}

async fn report_diff(diff: &PartitionDiff, output: Option<PathBuf>) -> Result<()> {
    log::info!(
        "{} added, {} removed",
        diff.added.len(),
        diff.removed.len()
    );
    for record in &diff.added {
        log::info!("  + {} {} ({})", record.identity, record.title, record.price);
    }
    for identity in &diff.removed {
        log::info!("  - {}", identity);
    }
    if let Some(path) = output {
        diff.save_added(&path).await?;
        log::info!("Saved {} new listings to {}", diff.added.len(), path.display());
    }
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);

    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    match cli.command {
        Command::Check {
            caller,
            destination,
            partition,
        } => {
            let store = Arc::new(LocalStore::open(&cli.storage_dir).await?);
            let watcher = Watcher::from_config(config, store, Arc::new(LogNotifier))?;
            let destination = destination.unwrap_or_else(|| caller.clone());

            let mut session = watcher.begin(&caller, &destination)?;
            if let Some(key) = partition {
                session = session.with_partition(key);
            }
            cancel_on_interrupt(session.cancel_token());

            let report = session.run().await?;
            if report.state == SessionState::Cancelled {
                log::warn!("Check cancelled");
            }
            for record in &report.new_records {
                log::info!("  + {} {} ({})", record.identity, record.title, record.price);
            }
        }

        Command::Watch {
            interval_secs,
            caller,
            destination,
            max_runs,
        } => {
            if interval_secs == 0 {
                return Err(AppError::validation("interval must be positive"));
            }
            let store = Arc::new(LocalStore::open(&cli.storage_dir).await?);
            let watcher = Watcher::from_config(config, store, Arc::new(LogNotifier))?;
            let schedule = Schedule {
                interval: Duration::from_secs(interval_secs),
                destination: destination.unwrap_or_else(|| caller.clone()),
                caller,
                max_runs,
            };

            let shutdown = CancellationToken::new();
            cancel_on_interrupt(shutdown.clone());
            pipeline::run_schedule(&watcher, &schedule, &shutdown).await;
        }

        Command::Compare { from, to, output } => {
            let store = LocalStore::open(&cli.storage_dir).await?;
            let diff = pipeline::compare_partitions(&store, &from, &to).await?;
            report_diff(&diff, output).await?;
        }

        Command::CompareFiles {
            previous,
            current,
            output,
        } => {
            let diff = pipeline::compare_snapshot_files(&previous, &current).await?;
            report_diff(&diff, output).await?;
        }

        Command::Export { output, partition } => {
            let store = LocalStore::open(&cli.storage_dir).await?;
            let records = match partition {
                Some(key) => store.load_by_partition(&key).await?,
                None => store
                    .load_oldest(usize::MAX)
                    .await?
                    .into_iter()
                    .map(|stored| stored.record)
                    .collect(),
            };

            let json = serde_json::to_string_pretty(&records)?;
            std::fs::write(&output, json)?;
            log::info!("Exported {} records to {}", records.len(), output.display());
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK (crawler, extractor, index, storage, notify)");
        }

        Command::Info => {
            let store = LocalStore::open(&cli.storage_dir).await?;
            log::info!("Storage directory: {}", store.root().display());
            log::info!("Catalog: {}", config.crawler.base_url);
            log::info!(
                "Records: {} (capacity {})",
                store.count().await?,
                config.storage.capacity
            );
            match store.updated_at().await {
                Some(updated) => log::info!("Last updated: {}", updated.to_rfc3339()),
                None => log::info!("No records stored yet."),
            }
            log::info!(
                "Index: {:?} over {:?}",
                config.index.strategy,
                config.index.lookback
            );
        }
    }

    log::info!("Done!");

    Ok(())
}

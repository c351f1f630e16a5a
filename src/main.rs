//! Site-Sentinel main entry point
//!
//! This is the command-line interface for the Site-Sentinel scan worker.

use anyhow::{bail, Context, Result};
use clap::Parser;
use site_sentinel::config::{load_config_with_hash, Config};
use site_sentinel::output::{load_statistics, print_scan, print_statistics, stored_report};
use site_sentinel::storage::{enqueue_scan, open_storage, ScanStore, SqliteStorage};
use site_sentinel::worker::{RunOutcome, WorkerRunner};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Site-Sentinel: a website security scan worker
///
/// Runs the single-instance worker that drains the scan queue, or queues and
/// inspects scans in the same database.
#[derive(Parser, Debug)]
#[command(name = "site-sentinel")]
#[command(version = "1.0.0")]
#[command(about = "A website security scan worker", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Queue a scan of URL and exit
    #[arg(long, value_name = "URL", conflicts_with_all = ["status", "show"])]
    enqueue: Option<String>,

    /// Queue the scan as a batch scan (used with --enqueue)
    #[arg(long, requires = "enqueue")]
    batch: bool,

    /// Show queue and scan statistics and exit
    #[arg(long, conflicts_with_all = ["enqueue", "show"])]
    status: bool,

    /// Show one scan's score and findings and exit
    #[arg(long, value_name = "SCAN_ID", conflicts_with_all = ["enqueue", "status"])]
    show: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let storage = open_storage(Path::new(&config.database.path))
        .with_context(|| format!("Failed to open database {}", config.database.path))?;

    if let Some(target) = &cli.enqueue {
        handle_enqueue(storage, target, cli.batch)
    } else if cli.status {
        handle_status(&storage)
    } else if let Some(scan_id) = cli.show {
        handle_show(&storage, scan_id)
    } else {
        handle_run(&config, storage).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_sentinel=info,warn"),
            1 => EnvFilter::new("site_sentinel=debug,info"),
            2 => EnvFilter::new("site_sentinel=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --enqueue: creates the scan record and its job
fn handle_enqueue(mut storage: SqliteStorage, target: &str, batch: bool) -> Result<()> {
    let queued = enqueue_scan(&mut storage, target, batch)
        .with_context(|| format!("Failed to queue scan of {}", target))?;
    println!(
        "Queued scan {} (job {}) for {}",
        queued.scan_id, queued.job_id, queued.url
    );
    Ok(())
}

/// Handles --status: shows statistics from the database
fn handle_status(storage: &SqliteStorage) -> Result<()> {
    let stats = load_statistics(storage).context("Failed to load statistics")?;
    print_statistics(&stats);
    Ok(())
}

/// Handles --show: prints one scan
fn handle_show(storage: &SqliteStorage, scan_id: i64) -> Result<()> {
    let scan = storage
        .get_scan(scan_id)
        .with_context(|| format!("Failed to load scan {}", scan_id))?;
    let report = stored_report(&scan).context("Stored report is not valid JSON")?;
    print_scan(&scan, report.as_ref());
    Ok(())
}

/// Runs the worker until ctrl-c
async fn handle_run(config: &Config, storage: SqliteStorage) -> Result<()> {
    let runner = WorkerRunner::from_config(config, storage).context("Failed to build worker")?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested; finishing in-flight scans");
            on_signal.cancel();
        }
    });

    match runner.run(shutdown).await.context("Worker failed")? {
        RunOutcome::AlreadyRunning { holder } => bail!(
            "another worker is already running ({})",
            holder.as_deref().unwrap_or("unknown holder")
        ),
        RunOutcome::Stopped { processed, failed } => {
            tracing::info!("Worker exited after {} scans ({} failed)", processed, failed);
            Ok(())
        }
    }
}

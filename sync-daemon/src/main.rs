//! sync-daemon binary entry point.
//!
//! Usage:
//! ```bash
//! sync-daemon run --config sync.toml
//! API_KEY=... ORGANIZATION_ID=... sync-daemon run
//! sync-daemon status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use sync_client::HttpSource;
use sync_core::BackoffPolicy;
use sync_daemon::config::Config;
use sync_daemon::engine::SyncEngine;
use sync_daemon::storage::{SqliteStorage, SyncStorage};
use sync_daemon::timer::run_fetch_loop;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Synchronize measurements from the streaming API into SQLite.
#[derive(Parser, Debug)]
#[command(name = "sync-daemon")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = "sync.toml")]
    config: PathBuf,

    /// API key (overrides api.key)
    #[arg(long, global = true, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Organization id (overrides api.organization_id)
    #[arg(long, global = true, env = "ORGANIZATION_ID")]
    organization_id: Option<String>,

    /// API base URL (overrides api.url)
    #[arg(long, global = true, env = "API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the synchronizer until Ctrl-C or a fatal error
    Run,

    /// Show stored measurements and ledger state
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Fatal: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run => {
            config.validate()?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.sync.worker_threads.max(2))
                .enable_all()
                .build()
                .context("Failed to build runtime")?;
            runtime.block_on(run(config))
        }
        Commands::Status => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to build runtime")?;
            runtime.block_on(status(config))
        }
    }
}

/// Read the config file and apply command-line/environment overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(&cli.config)?;

    if let Some(key) = &cli.api_key {
        config.api.key = Some(key.clone());
    }
    if let Some(organization_id) = &cli.organization_id {
        config.api.organization_id = Some(organization_id.clone());
    }
    if let Some(url) = &cli.api_url {
        config.api.url = url.clone();
    }

    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        "sync-daemon v{} starting (database: {}, replay: {})",
        env!("CARGO_PKG_VERSION"),
        config.storage.database.display(),
        if config.sync.replay_enabled { "enabled" } else { "disabled" }
    );

    let storage = Arc::new(
        SqliteStorage::new(&config.storage.database)
            .await
            .context("Failed to open database")?,
    );
    let source = Arc::new(HttpSource::new(config.source_config()).context("Failed to build HTTP client")?);
    let engine = SyncEngine::new(source, storage.clone(), config.engine_config());
    let backoff = BackoffPolicy::new(config.tick_interval(), config.max_backoff());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    let result = run_fetch_loop(engine, backoff, shutdown_rx).await;
    storage.close().await;
    result?;

    tracing::info!("sync-daemon stopped");
    Ok(())
}

async fn status(config: Config) -> Result<()> {
    let storage = SqliteStorage::open_existing(&config.storage.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open database {}",
                config.storage.database.display()
            )
        })?;

    println!("=== sync-daemon status ===");
    println!();
    println!("Database:     {}", config.storage.database.display());
    println!("Measurements: {}", storage.measurement_count().await?);
    println!();

    match storage.potential_window().await? {
        Some(window) => println!("Latest offset: {}", window.from),
        None => println!("Latest offset: none (no offset recorded yet)"),
    }

    let pending = storage.pending_windows().await?;
    println!("Pending replay windows: {}", pending.len());
    for window in &pending {
        println!("  {}", window);
    }
    if !pending.is_empty() && !config.sync.replay_enabled {
        println!();
        println!("Note: replay is disabled; set sync.replay_enabled = true to backfill.");
    }

    storage.close().await;
    Ok(())
}

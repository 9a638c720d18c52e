//! resync-engine - Offline sync reconciliation service
//!
//! Accepts sync operations over HTTP, persists them in a durable SQLite
//! queue and applies them with a pool of workers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use resync_common::config::{self, BootstrapConfig, CliOverrides};
use resync_common::events::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resync_engine::db::SyncQueue;
use resync_engine::worker::WorkerPool;
use resync_engine::{AppState, SyncServices};

/// Command-line arguments for resync-engine
#[derive(Parser, Debug)]
#[command(name = "resync-engine")]
#[command(about = "Offline sync reconciliation engine")]
#[command(version)]
struct Args {
    /// TOML configuration file (default: <config_dir>/resync/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder for the database and runtime files
    #[arg(short, long, env = "RESYNC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Database file (relative paths are inside the root folder)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "RESYNC_PORT")]
    port: Option<u16>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Number of queue workers
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before tracing so the configured log level applies from the start
    let (toml_config, config_source) = config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    let cli = CliOverrides {
        root_folder: args.root_folder,
        database_path: args.database,
        port: args.port,
        log_level: args.log_level,
        worker_count: args.workers,
    };
    let bootstrap = BootstrapConfig::resolve(cli, toml_config).context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("resync_engine={0},resync_common={0},tower_http=info", bootstrap.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resync-engine v{}", env!("CARGO_PKG_VERSION"));
    config_source.log();
    info!("Root folder: {}", bootstrap.root_folder.display());
    info!("Database: {}", bootstrap.database_path.display());

    let pool = resync_common::db::init_database(&bootstrap.database_path)
        .await
        .context("Failed to initialize database")?;

    SyncQueue::new(pool.clone())
        .recover_stale()
        .await
        .context("Failed to recover stale operations")?;

    let event_bus = EventBus::new(100);
    let services = SyncServices::build(pool, &bootstrap.sync, event_bus.clone())
        .context("Failed to build sync services")?;

    let workers = WorkerPool::spawn(
        services.controller.clone(),
        bootstrap.sync.worker_count,
        Duration::from_millis(bootstrap.sync.poll_interval_ms),
        services.engine.notifier(),
    );

    let app = resync_engine::build_router(AppState::new(services.engine, event_bus));

    let addr = SocketAddr::from(([127, 0, 0, 1], bootstrap.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    workers.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

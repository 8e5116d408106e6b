//! ivd-sync - Interview duration sync service
//!
//! Runs the sync scheduler in the background and serves the persisted
//! interviews over HTTP until Ctrl+C / SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ivd_common::config::{load_config, resolve_config_path, ConfigSource};
use ivd_common::logging::init_tracing;
use ivd_sync::db::{InterviewStore, SqliteInterviewRepository};
use ivd_sync::sync::{Schedule, Scheduler, SyncOrchestrator, SyncRunner};
use ivd_sync::transport::{HttpTransport, ReqwestTransport};
use ivd_sync::{build_router, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Command-line arguments for ivd-sync
#[derive(Parser, Debug)]
#[command(name = "ivd-sync")]
#[command(about = "Interview duration sync service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "IVD_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database file (overrides config and IVD_DATABASE_PATH)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Run a single sync cycle and exit without starting the server
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let (mut config, config_source) = load_config(config_path.as_deref())?;
    config.apply_env_overrides()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = init_tracing(&config.logging)?;

    info!(
        "Starting Interview Duration Sync (ivd-sync) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_source {
        ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
        ConfigSource::MissingFile(path) => {
            warn!("Config file {} not found, using built-in defaults", path.display())
        }
        ConfigSource::Defaults => warn!("No config file found, using built-in defaults"),
    }

    config.validate()?;

    let pool = ivd_common::db::init_database(&config.database_path).await?;
    info!("Database: {}", config.database_path.display());
    let store: Arc<dyn InterviewStore> = Arc::new(SqliteInterviewRepository::new(pool));

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(Duration::from_secs(
        config.kobo.request_timeout_secs,
    ))?);

    let orchestrator = SyncOrchestrator::from_config(transport, store.clone(), &config);
    let runner = Arc::new(SyncRunner::new(orchestrator));

    if args.once {
        let result = runner.try_run_cycle().await?;
        info!(state = ?result.state, persisted = result.persisted, "Single cycle complete");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(runner.clone(), Schedule::from_config(&config.schedule));
    let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));

    let state = AppState::new(store, runner);
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("ivd-sync listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // Waits for an in-flight cycle to finish
    cancel.cancel();
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task ended abnormally: {}", e);
    }
    info!("Scheduler shut down");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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

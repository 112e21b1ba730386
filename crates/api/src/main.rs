use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rtrain_core::compute::JobRegistry;
use rtrain_worker::Trainer;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rtrain_api::background::cleaner;
use rtrain_api::config::{ServerConfig, DEFAULT_CONFIG_PATH};
use rtrain_api::router::build_app_router;
use rtrain_api::state::AppState;

/// Remote training server: HTTP API, worker and cleaner in one process.
#[derive(Debug, Parser)]
#[command(name = "rtraind", version)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtrain_api=debug,rtrain_worker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let args = Args::parse();
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        auth_enabled = config.password.is_some(),
        "Loaded server configuration"
    );
    if config.password.is_none() {
        tracing::warn!("No password configured, authentication is disabled");
    }

    // --- Database ---
    let pool = rtrain_db::create_pool(&config.database_url)
        .await
        .context("Failed to open job database")?;
    tracing::info!("Database connection pool created");

    rtrain_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    rtrain_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let registry = Arc::new(JobRegistry::with_defaults());

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let trainer = Trainer::new(pool.clone(), Arc::clone(&registry), config.worker_config());
    let trainer_cancel = cancel.clone();
    let trainer_handle = tokio::spawn(async move {
        trainer.run(trainer_cancel).await;
    });

    let cleaner_handle = tokio::spawn(cleaner::run(
        pool.clone(),
        config.cleaner_config(),
        cancel.clone(),
    ));

    tracing::info!("Background services started (trainer, cleaner)");

    // --- App state ---
    let addr = SocketAddr::new(
        config.host.parse::<IpAddr>().context("Invalid host address")?,
        config.port,
    );
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let config = Arc::new(config);
    let state = AppState {
        pool: pool.clone(),
        config: Arc::clone(&config),
        registry,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    cancel.cancel();

    if tokio::time::timeout(shutdown_timeout, trainer_handle)
        .await
        .is_err()
    {
        tracing::warn!("Trainer did not stop in time");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), cleaner_handle).await;
    tracing::info!("Background services stopped");

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

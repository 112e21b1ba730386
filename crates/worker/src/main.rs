use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rtrain_core::compute::JobRegistry;
use rtrain_worker::{Trainer, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtrain_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = rtrain_db::create_pool(&database_url)
        .await
        .context("Failed to open job database")?;
    rtrain_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    rtrain_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Job database ready");

    let trainer = Trainer::new(pool, Arc::new(JobRegistry::with_defaults()), config);
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let handle = tokio::spawn(async move {
        trainer.run(cancel_clone).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    tracing::info!("Shutdown requested");

    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(30), handle)
        .await
        .is_err()
    {
        tracing::warn!("Trainer did not stop within 30s");
    }

    Ok(())
}

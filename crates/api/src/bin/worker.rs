//! Scheduled dispatch worker.
//!
//! Runs one worker batch every `WORKER_POLL_INTERVAL_SECS` under the shared
//! Redis lease, so it can run alongside on-demand runs triggered through the
//! API. A batch in progress always finishes before shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use flock_common::config::AppConfig;
use flock_common::db;
use flock_common::redis_pool::create_redis_pool;
use flock_engine::lease::{RedisLease, run_with_lease};
use flock_engine::{DispatchWorker, PgDirectory, PgJobStore};
use flock_notifier::WhatsAppClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flock_worker=info,flock_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Flock dispatch worker starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;
    let lease = RedisLease::new(create_redis_pool(&config.redis_url).await?);

    let worker = DispatchWorker::new(
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgDirectory::new(pool)),
        Arc::new(WhatsAppClient::from_config(&config)?),
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.worker_poll_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(
        interval_secs = config.worker_poll_interval_secs,
        lease_secs = config.worker_lease_seconds,
        "Dispatch worker started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_with_lease(&worker, &lease, config.worker_lease_seconds).await {
                    Ok(Some(summary)) if summary.processed > 0 => tracing::info!(
                        processed = summary.processed,
                        sent = summary.sent,
                        failed = summary.failed,
                        "Scheduled run finished"
                    ),
                    Ok(Some(_)) => {}
                    Ok(None) => tracing::debug!("Another worker run in progress, skipping tick"),
                    Err(e) => tracing::error!(error = %e, "Scheduled run failed"),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal, stopping gracefully...");
                break;
            }
        }
    }

    tracing::info!("Flock dispatch worker stopped.");
    Ok(())
}

//! Shared application state for the Axum API server.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use flock_common::config::AppConfig;
use flock_engine::{DispatchWorker, Enqueuer, PgDirectory, PgJobStore};
use flock_notifier::{ProviderClient, WhatsAppClient};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub config: AppConfig,
    pub enqueuer: Arc<Enqueuer>,
    pub worker: Arc<DispatchWorker>,
}

impl AppState {
    /// Build state with the WhatsApp Cloud API client from configuration.
    pub fn new(pool: PgPool, redis: ConnectionManager, config: AppConfig) -> anyhow::Result<Self> {
        let provider = Arc::new(WhatsAppClient::from_config(&config)?);
        Ok(Self::with_provider(pool, redis, config, provider))
    }

    pub fn with_provider(
        pool: PgPool,
        redis: ConnectionManager,
        config: AppConfig,
        provider: Arc<dyn ProviderClient>,
    ) -> Self {
        let store = Arc::new(PgJobStore::new(pool.clone()));
        let directory = Arc::new(PgDirectory::new(pool.clone()));

        let enqueuer = Enqueuer::new(
            store.clone(),
            directory.clone(),
            config.whatsapp_template_language.clone(),
        );
        let worker = DispatchWorker::new(store, directory, provider);

        Self {
            pool,
            redis,
            config,
            enqueuer: Arc::new(enqueuer),
            worker: Arc::new(worker),
        }
    }
}

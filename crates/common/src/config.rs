use std::str::FromStr;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (worker run lease)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Port the API server binds to (default: 3000)
    pub api_port: u16,

    /// JWT secret shared with the auth service that issues caller tokens
    pub jwt_secret: String,

    /// Shared secret presented by trusted callers of the worker run endpoint
    pub worker_token: String,

    /// Messaging provider base URL, without trailing slash
    pub whatsapp_api_base_url: String,

    /// Sender phone number id registered with the provider
    pub whatsapp_phone_number_id: String,

    /// Bearer token for the provider API
    pub whatsapp_api_token: String,

    /// Language code sent with template invocations (default: pt_BR)
    pub whatsapp_template_language: String,

    /// Per-request timeout for provider calls in seconds (default: 15)
    pub provider_timeout_secs: u64,

    /// Interval between scheduled worker runs in seconds (default: 60)
    pub worker_poll_interval_secs: u64,

    /// TTL of the worker run lease in seconds (default: 120)
    pub worker_lease_seconds: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 20)?,
            api_port: parsed("API_PORT", 3000)?,
            jwt_secret: required("JWT_SECRET")?,
            worker_token: required("WORKER_TOKEN")?,
            whatsapp_api_base_url: std::env::var("WHATSAPP_API_BASE_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".to_string())
                .trim_end_matches('/')
                .to_string(),
            whatsapp_phone_number_id: required("WHATSAPP_PHONE_NUMBER_ID")?,
            whatsapp_api_token: required("WHATSAPP_API_TOKEN")?,
            whatsapp_template_language: std::env::var("WHATSAPP_TEMPLATE_LANGUAGE")
                .unwrap_or_else(|_| "pt_BR".to_string()),
            provider_timeout_secs: parsed("PROVIDER_TIMEOUT_SECS", 15)?,
            worker_poll_interval_secs: parsed("WORKER_POLL_INTERVAL_SECS", 60)?,
            worker_lease_seconds: parsed("WORKER_LEASE_SECONDS", 120)?,
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable is required", name))
}

fn parsed<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                name,
                std::any::type_name::<T>()
            )
        }),
        Err(_) => Ok(default),
    }
}

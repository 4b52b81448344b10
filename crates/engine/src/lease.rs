//! Worker run lease: keeps overlapping worker invocations from draining the
//! queue at the same time.
//!
//! The Redis lease uses `SET NX EX` for atomic acquire with automatic TTL
//! expiry, and a compare-and-delete script on release so a run never frees a
//! lease that has already expired and been taken by another run. This narrows
//! the double-send window but is not a per-job claim: a run outliving its TTL
//! can still overlap the next one.
//!
//! Job rows stay the source of truth. When the lease backend itself fails,
//! the run goes ahead without a lease rather than stopping delivery.

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use flock_common::error::AppError;

use crate::worker::{DispatchWorker, RunSummary};

const LEASE_KEY: &str = "dispatch:worker:lease";

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Identifies the run holding a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken(String);

impl LeaseToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Mutual exclusion between worker runs.
#[async_trait]
pub trait RunLease: Send + Sync {
    /// Try to take the lease. `Ok(None)` means another run holds it.
    async fn acquire(&self, ttl_seconds: u64) -> Result<Option<LeaseToken>, AppError>;

    /// Release the lease if `token` still holds it.
    async fn release(&self, token: LeaseToken) -> Result<bool, AppError>;
}

/// Lease stored under a single Redis key.
#[derive(Clone)]
pub struct RedisLease {
    redis: ConnectionManager,
}

impl RedisLease {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RunLease for RedisLease {
    async fn acquire(&self, ttl_seconds: u64) -> Result<Option<LeaseToken>, AppError> {
        let token = LeaseToken::generate();
        let mut redis = self.redis.clone();

        // SET key token NX EX ttl → Some("OK") if taken, None if already held
        let result: Option<String> = redis::cmd("SET")
            .arg(LEASE_KEY)
            .arg(token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut redis)
            .await?;

        Ok(result.map(|_| token))
    }

    async fn release(&self, token: LeaseToken) -> Result<bool, AppError> {
        let mut redis = self.redis.clone();
        let deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(LEASE_KEY)
            .arg(token.as_str())
            .invoke_async(&mut redis)
            .await?;

        Ok(deleted == 1)
    }
}

/// Run one worker batch under the lease.
///
/// Returns `Ok(None)` without touching any job when another run holds the
/// lease. If the lease backend errors, the batch still runs unleased.
pub async fn run_with_lease(
    worker: &DispatchWorker,
    lease: &dyn RunLease,
    ttl_seconds: u64,
) -> Result<Option<RunSummary>, AppError> {
    let token = match lease.acquire(ttl_seconds).await {
        Ok(Some(token)) => Some(token),
        Ok(None) => {
            tracing::debug!("Worker lease held by another run, skipping");
            return Ok(None);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Worker lease unavailable, running without it");
            None
        }
    };

    let result = worker.run_batch().await;

    if let Some(token) = token {
        match lease.release(token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                ttl_seconds,
                "Worker lease expired before the run finished"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to release worker lease"),
        }
    }

    result.map(Some)
}

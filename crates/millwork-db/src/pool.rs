//! PostgreSQL pool for the millwork stores.
//!
//! Each running extraction job holds a connection for its whole batch write,
//! so the pool is sized from the worker's concurrency plus a share for API
//! requests.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use millwork_core::{Error, Result};

/// Connections kept for request handling on top of the job workers.
pub const REQUEST_CONNECTIONS: u32 = 8;

const ACQUIRE_TIMEOUT_SECS: u64 = 30;
const IDLE_TIMEOUT_SECS: u64 = 600;

/// Pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: REQUEST_CONNECTIONS + 2,
            acquire_timeout: Duration::from_secs(ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Reads `DATABASE_MAX_CONNECTIONS` and `DATABASE_ACQUIRE_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(n) = lookup("DATABASE_MAX_CONNECTIONS").and_then(|v| v.trim().parse().ok()) {
            config.max_connections = n;
        }
        if let Some(secs) =
            lookup("DATABASE_ACQUIRE_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok())
        {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Grow the pool so `concurrent_jobs` extractions never starve requests.
    pub fn for_workers(mut self, concurrent_jobs: usize) -> Self {
        let jobs = u32::try_from(concurrent_jobs).unwrap_or(u32::MAX);
        self.max_connections = self
            .max_connections
            .max(jobs.saturating_add(REQUEST_CONNECTIONS));
        self
    }
}

/// Connect with the default settings.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool ready"
    );
    Ok(pool)
}

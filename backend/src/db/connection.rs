use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::Config;

pub type DbPool = PgPool;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl From<&Config> for PoolSettings {
    fn from(config: &Config) -> Self {
        Self {
            database_url: config.database_url.clone(),
            max_connections: config.db_max_connections,
            acquire_timeout: config.db_acquire_timeout(),
        }
    }
}

/// A pool handle tagged with the generation it was created in.
#[derive(Debug, Clone)]
pub struct PoolLease {
    pub generation: u64,
    pub pool: DbPool,
}

/// Owner of the process-wide connection pool.
#[async_trait]
pub trait PoolManager: Send + Sync {
    /// Returns the current pool, creating it on first use.
    async fn lease(&self) -> Result<PoolLease, sqlx::Error>;

    /// Replaces the pool of `stale_generation`. A no-op when another caller
    /// already replaced it, so concurrent detectors yield a single new pool.
    async fn recreate(&self, stale_generation: u64) -> Result<(), sqlx::Error>;
}

pub struct LazyPool {
    settings: PoolSettings,
    current: Mutex<Option<PoolLease>>,
}

impl LazyPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            current: Mutex::new(None),
        }
    }

    fn build(&self, generation: u64) -> Result<PoolLease, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect_lazy(&self.settings.database_url)?;
        tracing::info!(
            generation,
            max_connections = self.settings.max_connections,
            "database pool created"
        );
        Ok(PoolLease { generation, pool })
    }

    pub async fn generation(&self) -> Option<u64> {
        self.current.lock().await.as_ref().map(|lease| lease.generation)
    }
}

#[async_trait]
impl PoolManager for LazyPool {
    async fn lease(&self) -> Result<PoolLease, sqlx::Error> {
        let mut current = self.current.lock().await;
        if let Some(lease) = current.as_ref() {
            return Ok(lease.clone());
        }
        let lease = self.build(0)?;
        *current = Some(lease.clone());
        Ok(lease)
    }

    async fn recreate(&self, stale_generation: u64) -> Result<(), sqlx::Error> {
        let mut current = self.current.lock().await;
        let stale = match current.as_ref() {
            Some(lease) if lease.generation == stale_generation => lease.clone(),
            _ => return Ok(()),
        };

        let replacement = self.build(stale_generation + 1)?;
        *current = Some(replacement);
        drop(current);

        tracing::warn!(stale_generation, "database pool recreated after fatal error");
        tokio::spawn(async move {
            stale.pool.close().await;
        });
        Ok(())
    }
}

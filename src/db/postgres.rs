//! Postgres connection pool

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use super::Database;
use crate::config::Settings;
use crate::error::ApiError;

/// Postgres pool wrapper.
///
/// Connections are opened lazily on first use, so constructing the pool
/// never blocks start-up on database availability. Concurrency control is
/// left to the pool's own acquire queue.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn connect_lazy(settings: &Settings) -> anyhow::Result<Self> {
        tracing::debug!(
            max_connections = settings.database_max_connections,
            "Creating lazy Postgres pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(settings.database_max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(&settings.database_url)?;

        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn ping(&self) -> Result<(), ApiError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

//! Database module
//!
//! The persistence layer is a single pool owned by the process entry point
//! and injected into the application state; procedures reach it through the
//! context.

pub mod postgres;

use async_trait::async_trait;

use crate::error::ApiError;

pub use postgres::PgDatabase;

#[async_trait]
pub trait Database: Send + Sync {
    /// Liveness probe used by readiness checks
    async fn ping(&self) -> Result<(), ApiError>;

    /// Release pooled connections on shutdown
    async fn close(&self) {}
}

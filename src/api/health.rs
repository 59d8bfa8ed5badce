//! Health check procedures
//!
//! Liveness and readiness probes for load balancers and orchestrators.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ApiError;
use crate::rpc::{Context, NoInput};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    NotReady,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: Readiness,
    pub timestamp: DateTime<Utc>,
}

/// GET /health
pub async fn health(_ctx: Context, _input: NoInput) -> Result<HealthResponse, ApiError> {
    Ok(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
    })
}

/// GET /ready
///
/// Probes the database. A failed probe is logged and reported as
/// `not_ready` rather than as an error.
pub async fn ready(ctx: Context, _input: NoInput) -> Result<ReadinessResponse, ApiError> {
    let db = ctx
        .db()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("database handle missing")))?;

    let status = match db.ping().await {
        Ok(()) => Readiness::Ready,
        Err(e) => {
            tracing::error!(error = %e, "Database is not ready");
            Readiness::NotReady
        }
    };

    Ok(ReadinessResponse {
        status,
        timestamp: Utc::now(),
    })
}

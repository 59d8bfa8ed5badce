//! Application state container
//!
//! Shared resources handed to every transport handler via axum's state
//! extraction. Everything is behind an `Arc`, so cloning is cheap.

use serde_json::Value;
use std::sync::Arc;

use crate::api;
use crate::auth::{AuthProxy, HttpAuthClient, SessionResolver};
use crate::config::Settings;
use crate::db::{Database, PgDatabase};
use crate::reporting::{ErrorReporter, LogReporter, WebhookReporter};
use crate::rpc::{ProcedureRouter, Procedures, RetryPolicy};
use crate::server::openapi;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,

    /// Every procedure reachable over RPC or REST
    pub procedures: Arc<ProcedureRouter>,

    /// Forwards `/api/auth/*` to the auth service
    pub auth_proxy: Arc<dyn AuthProxy>,

    pub database: Arc<dyn Database>,

    /// Generated OpenAPI document served at `/api/reference`
    pub openapi: Arc<Value>,
}

/// Externally backed collaborators of the application
pub struct Collaborators {
    pub sessions: Arc<dyn SessionResolver>,
    pub auth_proxy: Arc<dyn AuthProxy>,
    pub database: Arc<dyn Database>,
    pub reporter: Arc<dyn ErrorReporter>,
    /// The auth service's OpenAPI schema, merged into `/api/reference`
    pub auth_openapi: Option<Value>,
}

impl AppState {
    /// Wire the production collaborators from settings
    ///
    /// The database pool connects lazily, so start-up does not wait for
    /// the database to accept connections.
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        tracing::debug!(url = %settings.auth_service_url, "Creating auth service client");
        let auth_client = Arc::new(HttpAuthClient::from_settings(&settings)?);

        let database = Arc::new(PgDatabase::connect_lazy(&settings)?);

        let reporter: Arc<dyn ErrorReporter> = match &settings.error_reporting_url {
            Some(url) => {
                tracing::info!("Error reports will be posted to the configured endpoint");
                Arc::new(WebhookReporter::new(url.clone(), settings.environment.to_string())?)
            }
            None => Arc::new(LogReporter),
        };

        let auth_openapi = match auth_client.openapi_schema().await {
            Ok(schema) => Some(schema),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Auth service schema unavailable, API reference lists local routes only"
                );
                None
            }
        };

        Self::from_parts(
            settings,
            Collaborators {
                sessions: auth_client.clone(),
                auth_proxy: auth_client,
                database,
                reporter,
                auth_openapi,
            },
        )
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(settings: Settings, parts: Collaborators) -> anyhow::Result<Self> {
        let procedures = Procedures::new(
            RetryPolicy::from_settings(&settings.retry)?,
            parts.reporter,
            parts.sessions,
        );
        let router = api::router(&procedures, parts.database.clone());
        let document = openapi::build_document(&settings, &router, parts.auth_openapi.as_ref());

        tracing::info!(procedures = router.len(), "Application state initialized");

        Ok(Self {
            settings: Arc::new(settings),
            procedures: Arc::new(router),
            auth_proxy: parts.auth_proxy,
            database: parts.database,
            openapi: Arc::new(document),
        })
    }

    /// Whether 5xx error messages may be shown to clients
    pub fn expose_internal_errors(&self) -> bool {
        !self.settings.is_production()
    }
}

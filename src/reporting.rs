//! Error reporting sinks
//!
//! The observe middleware hands every failure that crosses it to an
//! [`ErrorReporter`] together with the request scope it collected before the
//! call. Reporting never affects the outcome of the call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ApiError;
use crate::rpc::{ClientInfo, Context};

/// Authenticated identity attached to a report
#[derive(Debug, Clone, Serialize)]
pub struct ReportedUser {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Request-scoped metadata attached to every report
#[derive(Debug, Clone, Serialize)]
pub struct ReportScope {
    pub request_id: String,
    pub trace_id: String,
    pub path: String,
    pub client: ClientInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ReportedUser>,
}

impl ReportScope {
    pub fn from_context(ctx: &Context) -> Self {
        let client = ctx.client_info();
        let user = ctx.user().map(|u| ReportedUser {
            id: u.id.clone(),
            email: u.email.clone(),
            ip_address: client.ip.clone(),
        });

        Self {
            request_id: ctx.request_id().to_string(),
            trace_id: ctx.trace_id().to_string(),
            path: ctx.path().to_string(),
            client,
            user,
        }
    }

    /// Tags used to group reports
    pub fn tags(&self) -> BTreeMap<&'static str, String> {
        let mut tags = BTreeMap::new();
        tags.insert("api.path", self.path.clone());
        tags.insert("request_id", self.request_id.clone());
        tags.insert("trace_id", self.trace_id.clone());
        tags
    }
}

pub trait ErrorReporter: Send + Sync {
    fn capture(&self, error: &ApiError, scope: &ReportScope);
}

/// Reports failures as structured log events
#[derive(Debug, Default, Clone)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn capture(&self, error: &ApiError, scope: &ReportScope) {
        tracing::error!(
            target: "error_report",
            code = error.code(),
            error = %error,
            path = %scope.path,
            request_id = %scope.request_id,
            trace_id = %scope.trace_id,
            user_id = scope.user.as_ref().map(|u| u.id.as_str()).unwrap_or("-"),
            "Captured exception"
        );
    }
}

#[derive(Debug, Serialize)]
struct ReportEvent<'a> {
    event_id: String,
    timestamp: DateTime<Utc>,
    level: &'static str,
    code: &'static str,
    message: String,
    tags: BTreeMap<&'static str, String>,
    scope: &'a ReportScope,
}

/// Posts failures as JSON to an ingest endpoint.
///
/// Delivery runs on a spawned task so a slow sink never delays the response;
/// delivery failures are logged and dropped.
#[derive(Clone)]
pub struct WebhookReporter {
    client: reqwest::Client,
    endpoint: String,
    environment: String,
}

impl WebhookReporter {
    pub fn new(endpoint: impl Into<String>, environment: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            environment: environment.into(),
        })
    }
}

impl ErrorReporter for WebhookReporter {
    fn capture(&self, error: &ApiError, scope: &ReportScope) {
        let mut tags = scope.tags();
        tags.insert("environment", self.environment.clone());

        let event = ReportEvent {
            event_id: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
            level: if error.status().is_server_error() { "error" } else { "warning" },
            code: error.code(),
            message: error.to_string(),
            tags,
            scope,
        };

        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode error report");
                return;
            }
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            match client.post(&endpoint).json(&payload).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(status = %response.status(), "Error report rejected by sink");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to deliver error report"),
            }
        });
    }
}

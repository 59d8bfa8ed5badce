//! Tracing and error-reporting middleware
//!
//! Pure observer: annotates the active span with request metadata, and on
//! failure marks the span, logs the failure and forwards it to the
//! [`ErrorReporter`] before handing the same error back up the chain.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::Span;

use super::context::Context;
use super::middleware::{Middleware, Next, ProcedureResult};
use crate::reporting::{ErrorReporter, ReportScope};

pub struct ObserveMiddleware {
    reporter: Arc<dyn ErrorReporter>,
}

impl ObserveMiddleware {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { reporter }
    }
}

#[async_trait]
impl Middleware for ObserveMiddleware {
    fn name(&self) -> &'static str {
        "observe"
    }

    async fn call(&self, ctx: Context, next: Next<'_>) -> ProcedureResult {
        let scope = ReportScope::from_context(&ctx);

        let span = Span::current();
        span.record("request.id", scope.request_id.as_str());
        span.record("trace.id", scope.trace_id.as_str());
        span.record("api.path", scope.path.as_str());
        if let Some(ip) = &scope.client.ip {
            span.record("client.address", ip.as_str());
        }
        if let Some(user_agent) = &scope.client.user_agent {
            span.record("user_agent.original", user_agent.as_str());
        }
        if let Some(user) = &scope.user {
            span.record("user.id", user.id.as_str());
        }

        let error = match next.run(ctx).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        span.record("otel.status_code", "ERROR");
        span.record("exception.message", tracing::field::display(&error));

        if error.status().is_server_error() {
            tracing::error!(
                error = %error,
                code = error.code(),
                path = %scope.path,
                client = ?scope.client,
                "Request failed"
            );
        } else {
            tracing::warn!(
                error = %error,
                code = error.code(),
                path = %scope.path,
                client = ?scope.client,
                "Request failed"
            );
        }

        self.reporter.capture(&error, &scope);

        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::rpc::testing::{CapturedEvents, RecordingHandler};
    use axum::http::{HeaderMap, HeaderValue};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tracing::Instrument;

    #[derive(Default)]
    struct CollectingReporter {
        reports: Mutex<Vec<(String, ReportScope)>>,
    }

    impl ErrorReporter for CollectingReporter {
        fn capture(&self, error: &crate::error::ApiError, scope: &ReportScope) {
            self.reports
                .lock()
                .unwrap()
                .push((error.to_string(), scope.clone()));
        }
    }

    fn ctx_with_client() -> Context {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4"));
        headers.insert("user-agent", HeaderValue::from_static("test-agent"));
        Context::new(headers, "req-9", "trace-9", "user/me")
    }

    async fn run(reporter: Arc<CollectingReporter>, handler: &RecordingHandler) -> ProcedureResult {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(ObserveMiddleware::new(reporter))];
        let input = Value::Null;
        Next::new(&chain, handler, &input).run(ctx_with_client()).await
    }

    #[tokio::test]
    async fn test_success_is_not_reported() {
        let reporter = Arc::new(CollectingReporter::default());
        let handler = RecordingHandler::succeeding(json!({"ok": true}));

        let result = run(reporter.clone(), &handler).await;

        assert_eq!(result.unwrap(), json!({"ok": true}));
        assert!(reporter.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_reported_and_rethrown_unchanged() {
        let events = CapturedEvents::default();
        let _guard = events.install();

        let reporter = Arc::new(CollectingReporter::default());
        let handler = RecordingHandler::always_failing("boom");

        let err = run(reporter.clone(), &handler).await.unwrap_err();

        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(err.to_string(), "boom");
        assert_eq!(handler.calls(), 1);

        let reports = reporter.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "boom");
        assert_eq!(reports[0].1.request_id, "req-9");
        assert_eq!(reports[0].1.path, "user/me");
        assert_eq!(reports[0].1.client.ip.as_deref(), Some("198.51.100.4"));

        let failures = events.with_message("Request failed");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].level, tracing::Level::ERROR);
        assert_eq!(failures[0].field("path"), Some("user/me"));
    }

    #[tokio::test]
    async fn test_span_marked_on_error() {
        let events = CapturedEvents::default();
        let _guard = events.install();

        let span = tracing::info_span!(
            "rpc",
            request.id = tracing::field::Empty,
            trace.id = tracing::field::Empty,
            api.path = tracing::field::Empty,
            client.address = tracing::field::Empty,
            user_agent.original = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
            exception.message = tracing::field::Empty,
        );

        let reporter = Arc::new(CollectingReporter::default());
        let handler = RecordingHandler::always_failing("boom");
        let _ = run(reporter, &handler).instrument(span).await;

        assert_eq!(events.span_field("request.id").as_deref(), Some("req-9"));
        assert_eq!(events.span_field("client.address").as_deref(), Some("198.51.100.4"));
        assert_eq!(events.span_field("user_agent.original").as_deref(), Some("test-agent"));
        assert_eq!(events.span_field("otel.status_code").as_deref(), Some("ERROR"));
        assert_eq!(events.span_field("exception.message").as_deref(), Some("boom"));
    }
}

//! Shared fixtures for pipeline unit tests

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{span, Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::Layer;

use super::context::{Context, RetryState};
use super::middleware::{Handler, ProcedureResult};
use crate::auth::{Session, SessionData, SessionResolver, User};
use crate::db::Database;
use crate::error::ApiError;

pub fn context() -> Context {
    Context::new(HeaderMap::new(), "req-test", "trace-test", "test/procedure")
}

pub fn sample_session() -> Session {
    Session {
        id: "ses_1".into(),
        user_id: "usr_1".into(),
        token: Some("tok".into()),
        expires_at: Utc::now() + Duration::hours(1),
        active_organization_id: None,
        ip_address: None,
        user_agent: None,
    }
}

pub fn sample_user() -> User {
    User {
        id: "usr_1".into(),
        email: "ada@example.com".into(),
        name: "Ada Lovelace".into(),
        email_verified: true,
        image: None,
    }
}

pub fn sample_session_data() -> SessionData {
    SessionData {
        session: sample_session(),
        user: sample_user(),
    }
}

/// Builds the error for the given call number (1-indexed)
type ErrorFactory = Box<dyn Fn(u32) -> ApiError + Send + Sync>;

struct HandlerInner {
    calls: AtomicU32,
    fail_first: u32,
    error: ErrorFactory,
    output: Value,
    last_input: Mutex<Option<Value>>,
    retry_states: Mutex<Vec<Option<RetryState>>>,
    users: Mutex<Vec<Option<String>>>,
}

/// Handler that fails a scripted number of times and records every call
#[derive(Clone)]
pub struct RecordingHandler {
    inner: Arc<HandlerInner>,
}

impl RecordingHandler {
    fn build(fail_first: u32, error: ErrorFactory, output: Value) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                calls: AtomicU32::new(0),
                fail_first,
                error,
                output,
                last_input: Mutex::new(None),
                retry_states: Mutex::new(Vec::new()),
                users: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn succeeding(output: Value) -> Self {
        Self::build(0, Box::new(|_| ApiError::Internal(anyhow::anyhow!("unused"))), output)
    }

    /// Fails the first `times` calls with `message`, then returns `output`
    pub fn failing_times(times: u32, message: &'static str, output: Value) -> Self {
        Self::build(
            times,
            Box::new(move |_| ApiError::Internal(anyhow::anyhow!(message))),
            output,
        )
    }

    pub fn always_failing(message: &'static str) -> Self {
        Self::build(
            u32::MAX,
            Box::new(move |_| ApiError::Internal(anyhow::anyhow!(message))),
            Value::Null,
        )
    }

    /// Fails every call with `"<prefix> <call number>"`
    pub fn always_failing_numbered(prefix: &'static str) -> Self {
        Self::build(
            u32::MAX,
            Box::new(move |call| ApiError::Internal(anyhow::anyhow!("{} {}", prefix, call))),
            Value::Null,
        )
    }

    pub fn always_failing_with(error: impl Fn() -> ApiError + Send + Sync + 'static) -> Self {
        Self::build(u32::MAX, Box::new(move |_| error()), Value::Null)
    }

    pub fn calls(&self) -> u32 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<Value> {
        self.inner.last_input.lock().unwrap().clone()
    }

    pub fn retry_states(&self) -> Vec<Option<RetryState>> {
        self.inner.retry_states.lock().unwrap().clone()
    }

    pub fn users(&self) -> Vec<Option<String>> {
        self.inner.users.lock().unwrap().clone()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn call(&self, ctx: Context, input: Value) -> ProcedureResult {
        let call = self.inner.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.last_input.lock().unwrap() = Some(input);
        self.inner.retry_states.lock().unwrap().push(ctx.retry().copied());
        self.inner
            .users
            .lock()
            .unwrap()
            .push(ctx.user().map(|u| u.id.clone()));

        if call <= self.inner.fail_first {
            Err((self.inner.error)(call))
        } else {
            Ok(self.inner.output.clone())
        }
    }
}

/// Session resolver with a fixed answer and a call counter
pub struct MockResolver {
    answer: Mutex<Option<Result<Option<SessionData>, String>>>,
    calls: AtomicU32,
}

impl MockResolver {
    pub fn with_session(data: SessionData) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Some(Ok(Some(data)))),
            calls: AtomicU32::new(0),
        })
    }

    pub fn anonymous() -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Some(Ok(None))),
            calls: AtomicU32::new(0),
        })
    }

    pub fn unreachable(message: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Some(Err(message.to_string()))),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionResolver for MockResolver {
    async fn get_session(&self, _headers: &HeaderMap) -> Result<Option<SessionData>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer.lock().unwrap().clone() {
            Some(Ok(data)) => Ok(data),
            Some(Err(message)) => Err(ApiError::Upstream(message)),
            None => Ok(None),
        }
    }
}

/// Database whose liveness is toggled by the test
pub struct MockDatabase {
    healthy: bool,
    pings: AtomicU32,
}

impl MockDatabase {
    pub fn new(healthy: bool) -> Arc<Self> {
        Arc::new(Self {
            healthy,
            pings: AtomicU32::new(0),
        })
    }

    pub fn pings(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn ping(&self) -> Result<(), ApiError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.healthy {
            Ok(())
        } else {
            Err(ApiError::Database("connection refused".into()))
        }
    }
}

/// A tracing event reduced to its level and stringified fields
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: tracing::Level,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Layer that records events and span fields for assertions
#[derive(Clone, Default)]
pub struct CapturedEvents {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
    span_fields: Arc<Mutex<HashMap<String, String>>>,
}

impl CapturedEvents {
    /// Route this thread's tracing output into the capture until the guard drops
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    /// Events whose `event` field equals `name`
    pub fn named(&self, name: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.field("event") == Some(name))
            .cloned()
            .collect()
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.field("message") == Some(message))
            .cloned()
            .collect()
    }

    /// Last value recorded for a span field, across all spans
    pub fn span_field(&self, name: &str) -> Option<String> {
        self.span_fields.lock().unwrap().get(name).cloned()
    }
}

#[derive(Default)]
struct FieldVisitor(HashMap<String, String>);

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_new_span(&self, attrs: &span::Attributes<'_>, _id: &span::Id, _ctx: LayerContext<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        self.span_fields.lock().unwrap().extend(visitor.0);
    }

    fn on_record(&self, _id: &span::Id, values: &span::Record<'_>, _ctx: LayerContext<'_, S>) {
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        self.span_fields.lock().unwrap().extend(visitor.0);
    }

    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: visitor.0,
        });
    }
}

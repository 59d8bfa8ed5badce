//! Per-call context threaded through a procedure chain
//!
//! A [`Context`] is created once at the transport boundary and is never
//! mutated across a middleware boundary: a middleware hands a
//! [`ContextPatch`] to the next step, which then sees a new context equal to
//! the parent overlaid with the patch. The only interior-mutable part is
//! [`ResponseHeaders`], which collects headers for the eventual HTTP response.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::auth::{Session, User};
use crate::db::Database;

/// Retry marker carried while inside a retry-controlled call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    /// Current attempt number (1-indexed)
    pub attempt: u32,
    pub max_attempts: u32,
    /// False once a retry loop owns the call; nested retry middlewares pass through
    pub can_retry: bool,
    /// Whether this is a repeated attempt
    pub is_retry: bool,
}

/// Headers to be added to the HTTP response of the current call
#[derive(Clone, Default)]
pub struct ResponseHeaders {
    inner: Arc<Mutex<HeaderMap>>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: HeaderName, value: HeaderValue) {
        let mut headers = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        headers.insert(name, value);
    }

    /// Copy of the headers collected so far
    pub fn snapshot(&self) -> HeaderMap {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Write collected headers into an outgoing header map, overriding duplicates
    pub fn apply_to(&self, target: &mut HeaderMap) {
        let headers = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for (name, value) in headers.iter() {
            target.insert(name.clone(), value.clone());
        }
    }
}

impl fmt::Debug for ResponseHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResponseHeaders").field(&self.snapshot()).finish()
    }
}

/// Client metadata derived from request headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let ip = get("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|ip| !ip.is_empty())
            .or_else(|| get("x-real-ip"));

        Self {
            user_agent: get(header::USER_AGENT.as_str()),
            ip,
            origin: get(header::ORIGIN.as_str()),
            referer: get(header::REFERER.as_str()),
        }
    }
}

/// Per-call state
#[derive(Clone)]
pub struct Context {
    session: Option<Session>,
    user: Option<User>,
    db: Option<Arc<dyn Database>>,
    retry: Option<RetryState>,
    request_headers: Arc<HeaderMap>,
    response_headers: ResponseHeaders,
    request_id: String,
    trace_id: String,
    path: String,
}

impl Context {
    /// Fresh context for one call; nothing resolved yet
    pub fn new(
        request_headers: HeaderMap,
        request_id: impl Into<String>,
        trace_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            session: None,
            user: None,
            db: None,
            retry: None,
            request_headers: Arc::new(request_headers),
            response_headers: ResponseHeaders::new(),
            request_id: request_id.into(),
            trace_id: trace_id.into(),
            path: path.into(),
        }
    }

    /// A new context with `patch` overlaid on this one; `self` is untouched
    pub fn merge(&self, patch: ContextPatch) -> Context {
        let mut merged = self.clone();
        if let Some(session) = patch.session {
            merged.session = Some(session);
        }
        if let Some(user) = patch.user {
            merged.user = Some(user);
        }
        if let Some(db) = patch.db {
            merged.db = Some(db);
        }
        if let Some(retry) = patch.retry {
            merged.retry = Some(retry);
        }
        merged
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn db(&self) -> Option<&Arc<dyn Database>> {
        self.db.as_ref()
    }

    pub fn retry(&self) -> Option<&RetryState> {
        self.retry.as_ref()
    }

    /// False when an enclosing retry loop already controls this call
    pub fn can_retry(&self) -> bool {
        self.retry.map_or(true, |r| r.can_retry)
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    pub fn response_headers(&self) -> &ResponseHeaders {
        &self.response_headers
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Procedure path, e.g. `health` or `user/me`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn client_info(&self) -> ClientInfo {
        ClientInfo::from_headers(&self.request_headers)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("path", &self.path)
            .field("request_id", &self.request_id)
            .field("trace_id", &self.trace_id)
            .field("session", &self.session.as_ref().map(|s| &s.id))
            .field("user", &self.user.as_ref().map(|u| &u.id))
            .field("db", &self.db.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

/// Fields a middleware adds for the remainder of the chain
#[derive(Default)]
pub struct ContextPatch {
    pub session: Option<Session>,
    pub user: Option<User>,
    pub db: Option<Arc<dyn Database>>,
    pub retry: Option<RetryState>,
}

impl ContextPatch {
    pub fn retry(state: RetryState) -> Self {
        Self {
            retry: Some(state),
            ..Self::default()
        }
    }

    pub fn auth(session: Session, user: User) -> Self {
        Self {
            session: Some(session),
            user: Some(user),
            ..Self::default()
        }
    }

    pub fn db(db: Arc<dyn Database>) -> Self {
        Self {
            db: Some(db),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::{sample_session, sample_user};

    fn context() -> Context {
        Context::new(HeaderMap::new(), "req-1", "trace-1", "health")
    }

    #[test]
    fn test_fresh_context_is_empty() {
        let ctx = context();
        assert!(ctx.session().is_none());
        assert!(ctx.user().is_none());
        assert!(ctx.db().is_none());
        assert!(ctx.retry().is_none());
        assert!(ctx.can_retry());
        assert_eq!(ctx.path(), "health");
    }

    #[test]
    fn test_merge_leaves_parent_untouched() {
        let parent = context();
        let child = parent.merge(ContextPatch::auth(sample_session(), sample_user()));

        assert!(parent.session().is_none());
        assert_eq!(child.session().map(|s| s.id.as_str()), Some("ses_1"));
        assert_eq!(child.user().map(|u| u.id.as_str()), Some("usr_1"));
        assert_eq!(child.request_id(), "req-1");
    }

    #[test]
    fn test_patch_wins_on_conflict() {
        let first = RetryState {
            attempt: 1,
            max_attempts: 3,
            can_retry: false,
            is_retry: false,
        };
        let second = RetryState {
            attempt: 2,
            is_retry: true,
            ..first
        };

        let ctx = context()
            .merge(ContextPatch::retry(first))
            .merge(ContextPatch::retry(second));

        assert_eq!(ctx.retry(), Some(&second));
        assert!(!ctx.can_retry());
    }

    #[test]
    fn test_empty_patch_keeps_fields() {
        let ctx = context().merge(ContextPatch::auth(sample_session(), sample_user()));
        let merged = ctx.merge(ContextPatch::default());
        assert_eq!(merged.session(), ctx.session());
    }

    #[test]
    fn test_response_headers_shared_across_merges() {
        let parent = context();
        let child = parent.merge(ContextPatch::default());
        child
            .response_headers()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        let snapshot = parent.response_headers().snapshot();
        assert_eq!(snapshot.get(header::CACHE_CONTROL).unwrap(), "no-store");
    }

    #[test]
    fn test_apply_to_overrides_existing_headers() {
        let ctx = context();
        ctx.response_headers()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        let mut target = HeaderMap::new();
        target.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        target.insert(header::VARY, HeaderValue::from_static("Origin"));
        ctx.response_headers().apply_to(&mut target);

        assert_eq!(target.get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(target.get(header::VARY).unwrap(), "Origin");
        assert_eq!(target.get_all(header::CACHE_CONTROL).iter().count(), 1);
    }

    #[test]
    fn test_client_info_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.0"));
        assert!(info.origin.is_none());
    }

    #[test]
    fn test_client_info_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.ip.as_deref(), Some("10.0.0.2"));
    }
}

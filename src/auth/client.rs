//! HTTP client for the auth service

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::Response,
};
use serde_json::Value;
use std::time::Duration;

use super::types::SessionData;
use crate::config::Settings;
use crate::error::ApiError;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Headers that carry session credentials
const CREDENTIAL_HEADERS: &[&str] = &["cookie", "authorization"];

/// Where the auth service publishes the OpenAPI schema of its own endpoints
pub const AUTH_OPENAPI_PATH: &str = "/api/auth/open-api/generate-schema";

/// Resolves the session attached to an inbound request
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// `Ok(None)` when the request carries no valid session
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<SessionData>, ApiError>;
}

/// A request bound for the auth service's own endpoints
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path and query as received, e.g. `/api/auth/sign-in/email`
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Forwards `/api/auth/*` traffic without entering the procedure chain
#[async_trait]
pub trait AuthProxy: Send + Sync {
    async fn forward(&self, request: ProxyRequest) -> Result<Response, ApiError>;
}

#[derive(Clone)]
pub struct HttpAuthClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(
            settings.auth_service_url.clone(),
            Duration::from_secs(settings.auth_timeout_seconds),
        )
    }

    /// Fetch the auth service's OpenAPI schema
    pub async fn openapi_schema(&self) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, AUTH_OPENAPI_PATH))
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("auth service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Upstream(format!(
                "auth schema request returned {}",
                status.as_u16()
            )));
        }

        let schema: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("invalid auth schema: {}", e)))?;

        if !schema["paths"].is_object() {
            return Err(ApiError::Upstream("auth schema has no paths".into()));
        }

        Ok(schema)
    }
}

#[async_trait]
impl SessionResolver for HttpAuthClient {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<SessionData>, ApiError> {
        let has_credentials = CREDENTIAL_HEADERS.iter().any(|h| headers.contains_key(*h));
        if !has_credentials {
            return Ok(None);
        }

        let mut request = self
            .client
            .get(format!("{}/api/auth/get-session", self.base_url));
        for name in CREDENTIAL_HEADERS {
            if let Some(value) = headers.get(*name) {
                request = request.header(*name, value.as_bytes());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("auth service unreachable: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ApiError::Upstream(format!(
                "auth service returned {}",
                status.as_u16()
            )));
        }

        let data: Option<SessionData> = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("invalid session payload: {}", e)))?;

        Ok(data.filter(|d| !d.session.is_expired()))
    }
}

#[async_trait]
impl AuthProxy for HttpAuthClient {
    async fn forward(&self, request: ProxyRequest) -> Result<Response, ApiError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| ApiError::invalid_input(e.to_string()))?;
        let url = format!("{}{}", self.base_url, request.path_and_query);

        let mut upstream = self.client.request(method, url);
        for (name, value) in request.headers.iter() {
            if !is_hop_by_hop(name.as_str()) {
                upstream = upstream.header(name.as_str(), value.as_bytes());
            }
        }

        let response = upstream
            .body(request.body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("auth service unreachable: {}", e)))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in response.headers().iter() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Upstream(format!("auth service body: {}", e)))?;

        let mut proxied = Response::new(Body::from(body));
        *proxied.status_mut() = status;
        *proxied.headers_mut() = headers;
        Ok(proxied)
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

//! CORS middleware
//!
//! Preflight requests are answered here with `204 No Content` for every
//! path, including the auth proxy. All other responses get the origin and
//! credential headers appended on the way out.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::CorsSettings;

/// Precomputed header values for the configured policy
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: Vec<HeaderValue>,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    expose_headers: HeaderValue,
    max_age: HeaderValue,
    credentials: bool,
}

impl CorsPolicy {
    pub fn from_settings(settings: &CorsSettings) -> anyhow::Result<Self> {
        let origins = settings
            .origins
            .iter()
            .map(|o| HeaderValue::from_str(o))
            .collect::<Result<Vec<_>, _>>()?;
        if origins.is_empty() {
            anyhow::bail!("CORS policy needs at least one origin");
        }

        Ok(Self {
            origins,
            allow_methods: HeaderValue::from_str(&settings.allow_methods.join(", "))?,
            allow_headers: HeaderValue::from_str(&settings.allow_headers.join(", "))?,
            expose_headers: HeaderValue::from_str(&settings.expose_headers.join(", "))?,
            max_age: HeaderValue::from(settings.max_age_seconds),
            credentials: settings.credentials,
        })
    }

    /// The request origin when allowed, otherwise the first configured origin
    fn allow_origin(&self, request_origin: Option<&HeaderValue>) -> HeaderValue {
        request_origin
            .and_then(|origin| self.origins.iter().find(|allowed| *allowed == origin))
            .unwrap_or(&self.origins[0])
            .clone()
    }

    fn apply_common(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.allow_origin(origin),
        );
        if self.credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }

    fn preflight(&self, origin: Option<&HeaderValue>) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        self.apply_common(origin, headers);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allow_methods.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            self.allow_headers.clone(),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());

        response
    }
}

pub async fn cors(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();

    if request.method() == Method::OPTIONS {
        return policy.preflight(origin.as_ref());
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    policy.apply_common(origin.as_ref(), headers);
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        policy.expose_headers.clone(),
    );
    response
}

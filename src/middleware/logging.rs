//! Request logging middleware
//!
//! Assigns every inbound request a request id and trace id, logs the
//! request and its outcome, and echoes both ids on the response.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Settings;

/// Header name for trace ID
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest inbound id accepted; longer values are replaced
pub const MAX_ID_LEN: usize = 128;

/// Correlation ids stored in request extensions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

impl RequestIds {
    /// Fresh ids for a request that carries none
    pub fn generate() -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            request_id: id.clone(),
            trace_id: id,
        }
    }

    /// Take ids from inbound headers; each falls back to the other, then to a new uuid
    ///
    /// Values longer than [`MAX_ID_LEN`] or containing anything but visible
    /// ASCII are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            let value = headers.get(name)?.to_str().ok()?.trim();
            if value.is_empty() {
                return None;
            }
            if !is_acceptable_id(value) {
                tracing::debug!(header = name, len = value.len(), "Ignoring malformed inbound id");
                return None;
            }
            Some(value.to_string())
        };

        match (get(REQUEST_ID_HEADER), get(TRACE_ID_HEADER)) {
            (Some(request_id), Some(trace_id)) => Self {
                request_id,
                trace_id,
            },
            (Some(id), None) | (None, Some(id)) => Self {
                request_id: id.clone(),
                trace_id: id,
            },
            (None, None) => Self::generate(),
        }
    }
}

fn is_acceptable_id(value: &str) -> bool {
    value.len() <= MAX_ID_LEN && value.bytes().all(|b| b.is_ascii_graphic())
}

/// Log HTTP requests and responses
///
/// Outside development the request headers of interest are logged too.
pub async fn log_request(
    State(settings): State<Arc<Settings>>,
    mut request: Request,
    next: Next,
) -> Response<Body> {
    let start = Instant::now();

    let ids = RequestIds::from_headers(request.headers());
    request.extensions_mut().insert(ids.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(|q| q.to_string());

    if settings.is_development() {
        tracing::info!(
            request_id = %ids.request_id,
            method = %method,
            path = %path,
            "Incoming request"
        );
    } else {
        let header_str = |name: header::HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string()
        };
        let content_length = request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        tracing::info!(
            request_id = %ids.request_id,
            trace_id = %ids.trace_id,
            method = %method,
            path = %path,
            query = %query.as_deref().unwrap_or("-"),
            version = ?request.version(),
            user_agent = %header_str(header::USER_AGENT),
            origin = %header_str(header::ORIGIN),
            content_length = content_length,
            "Incoming request"
        );
    }

    let span = tracing::info_span!(
        "http_request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path,
    );

    let mut response = next.run(request).instrument(span).await;

    let duration_ms = format!("{:.2}", start.elapsed().as_secs_f64() * 1000.0);
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            request_id = %ids.request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %duration_ms,
            "Server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            request_id = %ids.request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %duration_ms,
            "Client error"
        );
    } else {
        tracing::info!(
            request_id = %ids.request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %duration_ms,
            "Request completed"
        );
    }

    if !settings.is_development() {
        tracing::debug!(
            request_id = %ids.request_id,
            content_type = ?response.headers().get(header::CONTENT_TYPE),
            content_length = ?response.headers().get(header::CONTENT_LENGTH),
            "Response details"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&ids.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&ids.trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    #[test]
    fn test_generated_ids_are_uuids() {
        let ids = RequestIds::generate();
        assert_eq!(ids.request_id.len(), 36);
        assert_eq!(ids.request_id, ids.trace_id);
    }

    #[test]
    fn test_ids_taken_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACE_ID_HEADER, HeaderValue::from_static("trace-abc"));
        let ids = RequestIds::from_headers(&headers);
        assert_eq!(ids.request_id, "trace-abc");
        assert_eq!(ids.trace_id, "trace-abc");

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-abc"));
        let ids = RequestIds::from_headers(&headers);
        assert_eq!(ids.request_id, "req-abc");
        assert_eq!(ids.trace_id, "trace-abc");
    }

    #[test]
    fn test_oversized_ids_replaced() {
        let mut headers = HeaderMap::new();
        let long = "a".repeat(MAX_ID_LEN + 1);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(&long).unwrap());

        let ids = RequestIds::from_headers(&headers);
        assert_eq!(ids.request_id.len(), 36);
        assert_eq!(ids.request_id, ids.trace_id);

        let exact = "b".repeat(MAX_ID_LEN);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(&exact).unwrap());
        assert_eq!(RequestIds::from_headers(&headers).request_id, exact);
    }

    #[test]
    fn test_unprintable_ids_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req 1\tinjected"));
        headers.insert(TRACE_ID_HEADER, HeaderValue::from_bytes(b"tr\xc3\xa9ce").unwrap());

        let ids = RequestIds::from_headers(&headers);
        assert_eq!(ids.request_id.len(), 36);
        assert!(Uuid::parse_str(&ids.trace_id).is_ok());

        // A bad request id falls back to a good trace id
        headers.insert(TRACE_ID_HEADER, HeaderValue::from_static("trace-ok"));
        let ids = RequestIds::from_headers(&headers);
        assert_eq!(ids.request_id, "trace-ok");
        assert_eq!(ids.trace_id, "trace-ok");
    }

    #[tokio::test]
    async fn test_ids_exposed_to_handler_and_response() {
        async fn echo(Extension(ids): Extension<RequestIds>) -> String {
            ids.request_id
        }

        let settings = Arc::new(Settings::default());
        let app = Router::new()
            .route("/", get(echo))
            .layer(middleware::from_fn_with_state(settings, log_request));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-42");
        assert_eq!(response.headers().get(TRACE_ID_HEADER).unwrap(), "req-42");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"req-42");
    }
}

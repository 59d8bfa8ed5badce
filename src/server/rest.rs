//! REST transport, auth proxy and API reference
//!
//! Procedures with a declared route are served by method and path, both at
//! the root and under `/api`. Input is assembled from path parameters, then
//! query parameters, then the fields of a JSON object body.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::auth::ProxyRequest;
use crate::error::ApiError;
use crate::middleware::RequestIds;
use crate::server::dispatch::{call_procedure, reject};
use crate::server::rpc::{parse_json, request_ids};
use crate::server::state::AppState;

/// A REST call with any `/api` prefix already stripped from `path`
pub struct RestRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// GET /health, GET /ready
pub async fn root(
    State(state): State<AppState>,
    ids: Option<Extension<RequestIds>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ids = request_ids(ids, &headers);
    dispatch(
        &state,
        &ids,
        RestRequest {
            method,
            path: uri.path().to_string(),
            query,
            headers,
            body,
        },
    )
    .await
}

/// ANY /api/{*path}
pub async fn api(
    State(state): State<AppState>,
    ids: Option<Extension<RequestIds>>,
    method: Method,
    Path(path): Path<String>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ids = request_ids(ids, &headers);

    if path == "auth" || path.starts_with("auth/") {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());
        return proxy_auth(
            &state,
            &ids,
            ProxyRequest {
                method,
                path_and_query,
                headers,
                body,
            },
        )
        .await;
    }

    if path == "reference" && method == Method::GET {
        return Json(state.openapi.as_ref().clone()).into_response();
    }

    dispatch(
        &state,
        &ids,
        RestRequest {
            method,
            path: format!("/{}", path),
            query,
            headers,
            body,
        },
    )
    .await
}

async fn dispatch(state: &AppState, ids: &RequestIds, request: RestRequest) -> Response {
    let Some(found) = state
        .procedures
        .resolve_rest(&request.method, &request.path)
    else {
        return reject(ApiError::NotFound(request.path), state, ids);
    };

    let input = match rest_input(found.params, request.query, &request.body) {
        Ok(input) => input,
        Err(e) => return reject(e, state, ids),
    };

    let success = found
        .procedure
        .route()
        .map(|r| r.success_status)
        .unwrap_or_default();

    call_procedure(found.name, found.procedure, &request.headers, ids, input)
        .await
        .into_response(success, state, ids)
}

/// Merge path params, query params and a JSON object body into one input
fn rest_input(
    params: Map<String, Value>,
    query: HashMap<String, String>,
    body: &[u8],
) -> Result<Value, ApiError> {
    let mut input = params;
    for (key, value) in query {
        input.entry(key).or_insert(Value::String(value));
    }

    match parse_json(body)? {
        Value::Null => {}
        Value::Object(fields) => input.extend(fields),
        other if input.is_empty() => return Ok(other),
        _ => {
            return Err(ApiError::invalid_input(
                "Request body must be a JSON object",
            ))
        }
    }

    if input.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(input))
    }
}

/// Hand `/api/auth/*` to the auth service untouched
async fn proxy_auth(state: &AppState, ids: &RequestIds, request: ProxyRequest) -> Response {
    tracing::debug!(
        method = %request.method,
        path = %request.path_and_query,
        "Forwarding to auth service"
    );

    match state.auth_proxy.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Auth service request failed");
            reject(e, state, ids)
        }
    }
}

/// Fallback for every unmatched route
pub async fn not_found(
    State(state): State<AppState>,
    ids: Option<Extension<RequestIds>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let ids = request_ids(ids, &headers);
    reject(ApiError::NotFound(uri.path().to_string()), &state, &ids)
}

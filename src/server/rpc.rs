//! RPC transport
//!
//! `/rpc/{path}` calls the procedure registered under `path`. The input is
//! the raw JSON request body, or the `input` query parameter for GET.
//! `POST /rpc` with the batch header runs several calls in one request.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::middleware::RequestIds;
use crate::server::dispatch::{call_procedure, reject};
use crate::server::state::AppState;

/// Marks a request body as a list of calls
pub const BATCH_HEADER: &str = "x-orpc-batch";

#[derive(Debug, Default, Deserialize)]
pub struct RpcQuery {
    input: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchCall {
    pub path: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Serialize)]
pub struct BatchReply {
    pub status: u16,
    pub body: Value,
}

pub(crate) fn request_ids(ids: Option<Extension<RequestIds>>, headers: &HeaderMap) -> RequestIds {
    match ids {
        Some(Extension(ids)) => ids,
        None => RequestIds::from_headers(headers),
    }
}

/// Parse a JSON payload; an empty payload is `null`
pub(crate) fn parse_json(raw: &[u8]) -> Result<Value, ApiError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(raw)
        .map_err(|e| ApiError::invalid_input(format!("Malformed JSON payload: {}", e)))
}

/// ANY /rpc/{*path}
pub async fn handle(
    State(state): State<AppState>,
    ids: Option<Extension<RequestIds>>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<RpcQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ids = request_ids(ids, &headers);

    let input = if method == Method::GET {
        parse_json(query.input.as_deref().unwrap_or_default().as_bytes())
    } else {
        parse_json(&body)
    };
    let input = match input {
        Ok(input) => input,
        Err(e) => return reject(e, &state, &ids),
    };

    let Some((name, procedure)) = state.procedures.resolve_rpc(&path) else {
        return reject(
            ApiError::NotFound(format!("procedure {}", path)),
            &state,
            &ids,
        );
    };

    call_procedure(name, procedure, &headers, &ids, input)
        .await
        .into_response(StatusCode::OK, &state, &ids)
}

/// POST /rpc with the batch header
///
/// Calls run one after another, each with its own context; the reply lists
/// one `{status, body}` per call in request order.
pub async fn batch(
    State(state): State<AppState>,
    ids: Option<Extension<RequestIds>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ids = request_ids(ids, &headers);

    if !headers.contains_key(BATCH_HEADER) {
        return reject(
            ApiError::NotFound("procedure path missing".to_string()),
            &state,
            &ids,
        );
    }

    let calls: Vec<BatchCall> = match serde_json::from_slice(&body) {
        Ok(calls) => calls,
        Err(e) => {
            return reject(
                ApiError::invalid_input(format!("Malformed batch payload: {}", e)),
                &state,
                &ids,
            )
        }
    };

    tracing::debug!(calls = calls.len(), "Running batch");

    let expose_internal = state.expose_internal_errors();
    let mut replies = Vec::with_capacity(calls.len());
    let mut response_headers = HeaderMap::new();

    for call in calls {
        let reply = match state.procedures.resolve_rpc(&call.path) {
            Some((name, procedure)) => {
                let outcome = call_procedure(name, procedure, &headers, &ids, call.input).await;
                outcome.headers.apply_to(&mut response_headers);
                let (status, body) =
                    outcome.status_and_body(StatusCode::OK, &ids.request_id, expose_internal);
                BatchReply {
                    status: status.as_u16(),
                    body,
                }
            }
            None => {
                let error = ApiError::NotFound(format!("procedure {}", call.path));
                BatchReply {
                    status: error.status().as_u16(),
                    body: serde_json::to_value(error.to_body(Some(&ids.request_id), expose_internal))
                        .unwrap_or(Value::Null),
                }
            }
        };
        replies.push(reply);
    }

    let mut response = Json(replies).into_response();
    response.headers_mut().extend(response_headers);
    response
}

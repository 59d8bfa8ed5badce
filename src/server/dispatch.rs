//! Procedure execution shared by both transports

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::{field::Empty, Instrument};

use crate::error::ApiError;
use crate::middleware::RequestIds;
use crate::rpc::{Context, Procedure, ResponseHeaders};
use crate::server::state::AppState;

/// Result of one procedure call, ready to be rendered by a transport
pub struct CallOutcome {
    pub result: Result<Value, ApiError>,
    /// Headers set by the chain through the context
    pub headers: ResponseHeaders,
}

/// Run `procedure` with a fresh context inside an `rpc` span
pub async fn call_procedure(
    name: &str,
    procedure: &Procedure,
    headers: &HeaderMap,
    ids: &RequestIds,
    input: Value,
) -> CallOutcome {
    let ctx = Context::new(headers.clone(), &ids.request_id, &ids.trace_id, name);
    let response_headers = ctx.response_headers().clone();

    let span = tracing::info_span!(
        "rpc",
        otel.kind = "server",
        rpc.system = "orpc",
        rpc.method = %name,
        request.id = Empty,
        trace.id = Empty,
        api.path = Empty,
        client.address = Empty,
        user_agent.original = Empty,
        user.id = Empty,
        retry.attempt = Empty,
        retry.max_attempts = Empty,
        retry.is_retry = Empty,
        otel.status_code = Empty,
        exception.message = Empty,
    );

    let result = procedure.call(ctx, input).instrument(span).await;

    CallOutcome {
        result,
        headers: response_headers,
    }
}

impl CallOutcome {
    /// HTTP status and JSON body for this outcome
    pub fn status_and_body(
        &self,
        success: StatusCode,
        request_id: &str,
        expose_internal: bool,
    ) -> (StatusCode, Value) {
        match &self.result {
            Ok(value) => (success, value.clone()),
            Err(error) => {
                let body = error.to_body(Some(request_id), expose_internal);
                (
                    error.status(),
                    serde_json::to_value(body).unwrap_or(Value::Null),
                )
            }
        }
    }

    pub fn into_response(self, success: StatusCode, state: &AppState, ids: &RequestIds) -> Response {
        let mut response = match self.result {
            Ok(value) => (success, Json(value)).into_response(),
            Err(error) => error.to_response(Some(&ids.request_id), state.expose_internal_errors()),
        };
        self.headers.apply_to(response.headers_mut());
        response
    }
}

/// Render a failure that happened before any procedure ran
pub fn reject(error: ApiError, state: &AppState, ids: &RequestIds) -> Response {
    error.to_response(Some(&ids.request_id), state.expose_internal_errors())
}

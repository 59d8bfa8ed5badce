//! API error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use validator::ValidationErrors;

/// Message returned instead of internal error detail when detail is hidden
const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Input validation failed: {message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, Vec<String>>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Validation failure without field detail (e.g. malformed JSON)
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Stable error code exposed to clients
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Validation { .. } => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Upstream(_) => "BAD_GATEWAY",
            ApiError::Database(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a repeated attempt could produce a different outcome.
    ///
    /// Authentication, permission, validation and routing decisions are
    /// deterministic for a given request; everything else is treated as
    /// transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ApiError::Unauthorized
                | ApiError::Forbidden(_)
                | ApiError::Validation { .. }
                | ApiError::NotFound(_)
        )
    }

    /// Client-facing body for this error.
    ///
    /// `expose_internal` controls whether messages of 5xx errors reach the
    /// client; production deployments hide them.
    pub fn to_body(&self, request_id: Option<&str>, expose_internal: bool) -> ErrorResponse {
        let status = self.status();

        let message = if status.is_server_error() && !expose_internal {
            GENERIC_INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        let data = match self {
            ApiError::Validation { fields, .. } if !fields.is_empty() => {
                Some(serde_json::json!({ "fields": fields }))
            }
            _ => None,
        };

        ErrorResponse {
            code: self.code().to_string(),
            status: status.as_u16(),
            message,
            request_id: request_id.map(str::to_string),
            data,
        }
    }

    /// Render the error as an HTTP response
    pub fn to_response(&self, request_id: Option<&str>, expose_internal: bool) -> Response {
        (self.status(), Json(self.to_body(request_id, expose_internal))).into_response()
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| match &e.message {
                        Some(msg) => msg.to_string(),
                        None => e.code.to_string(),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();

        ApiError::Validation {
            message: "one or more fields are invalid".to_string(),
            fields,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.to_response(None, false)
    }
}

/// JSON error body returned by both transports
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

//! API error types with HTTP response mapping.

use analytics::AnalyticsError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, FieldError};
use workflow::WorkflowError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No identity was forwarded for an endpoint that needs one.
    Unauthorized(String),
    /// The caller's role may not use this endpoint.
    Forbidden(String),
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Input fields failed validation.
    Validation(Vec<FieldError>),
    /// Use case error.
    Workflow(WorkflowError),
    /// Reporting error.
    Analytics(AnalyticsError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Validation(fields) => validation_response(&fields),
            ApiError::Workflow(err) => workflow_error_to_response(err),
            ApiError::Analytics(err) => analytics_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = match details {
            Some(details) => serde_json::json!({ "error": message, "details": details }),
            None => serde_json::json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

type Parts = (StatusCode, String, Option<serde_json::Value>);

fn validation_response(fields: &[FieldError]) -> Parts {
    let details = fields
        .iter()
        .map(|f| serde_json::json!({ "field": f.field, "message": f.message }))
        .collect();
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        "Validation failed".to_string(),
        Some(serde_json::Value::Array(details)),
    )
}

fn workflow_error_to_response(err: WorkflowError) -> Parts {
    match err {
        WorkflowError::ValidationFailed(fields) => validation_response(&fields),
        WorkflowError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string(), None),
        WorkflowError::InvalidTransition(_)
        | WorkflowError::InsufficientStock { .. }
        | WorkflowError::OutOfStock { .. }
        | WorkflowError::InvalidSignature
        | WorkflowError::BadRequest(_)
        | WorkflowError::Coupon(_) => (StatusCode::BAD_REQUEST, err.to_string(), None),
        WorkflowError::Conflict(_) => (StatusCode::CONFLICT, err.to_string(), None),
        WorkflowError::PaymentProvider(_) | WorkflowError::AssetStore(_) => {
            tracing::error!(error = %err, "upstream service failed");
            (
                StatusCode::BAD_GATEWAY,
                "Upstream service unavailable, please retry".to_string(),
                None,
            )
        }
        WorkflowError::Store(_) => {
            tracing::error!(error = %err, "store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                None,
            )
        }
    }
}

fn analytics_error_to_response(err: AnalyticsError) -> Parts {
    match err {
        AnalyticsError::InvalidPeriod(_) => {
            validation_response(&[FieldError::new("period", err.to_string())])
        }
        AnalyticsError::InvalidGrouping(_) => {
            validation_response(&[FieldError::new("group_by", err.to_string())])
        }
        AnalyticsError::InvalidRanking(_) => {
            validation_response(&[FieldError::new("sort_by", err.to_string())])
        }
        AnalyticsError::InvalidRange { .. } => {
            validation_response(&[FieldError::new("start_date", err.to_string())])
        }
        AnalyticsError::Store(_) => {
            tracing::error!(error = %err, "store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                None,
            )
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        ApiError::Analytics(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Workflow(err.into())
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

//! API error envelope (§6): `{error:{code, message, details?, timestamp,
//! recovery_attempted?, retry_count?, fallback_applied?, partial?,
//! checkpoint_id?}}`, with status codes 400/404/422/500/503 as specified.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("run not found: {0}")]
    NotFound(String),

    #[error("semantically invalid request: {0}")]
    UnprocessableEntity(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("dependency unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::UnprocessableEntity(_) => "VALIDATION_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
                timestamp: Utc::now(),
            },
        };
        tracing::warn!(code = body.error.code, "api error: {}", body.error.message);
        (status, Json(body)).into_response()
    }
}

impl From<crate::error::OrchestratorError> for ApiError {
    fn from(err: crate::error::OrchestratorError) -> Self {
        use crate::error::OrchestratorError::*;
        match err {
            RunNotFound(msg) => ApiError::NotFound(msg),
            InvalidRequest(msg) => ApiError::BadRequest(msg),
            Graph(e) => ApiError::Internal(e.to_string()),
            Storage(e) => ApiError::ServiceUnavailable(e.to_string()),
            Serialization(e) => ApiError::Internal(e.to_string()),
            Configuration(msg) => ApiError::Internal(msg),
            General(msg) => ApiError::Internal(msg),
        }
    }
}

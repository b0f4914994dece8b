//! API error responses

use crate::OrchestratorError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error wrapper mapping orchestrator errors onto HTTP responses
pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(error: OrchestratorError) -> Self {
        Self(error)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        Self(OrchestratorError::Database(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::TemplateInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::ExecutionFailed(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Result alias for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

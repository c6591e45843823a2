use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;
use crate::models::TodoField;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Schema outdated: field `{0}` is not supported by the data store")]
    SchemaOutdated(TodoField),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::CapabilityUnavailable(msg) => (StatusCode::CONFLICT, msg),
            AppError::SchemaOutdated(field) => {
                error!("store rejected field `{}` after retry", field);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!(
                        "The data store does not support the `{}` field. Refresh the backend schema and try again.",
                        field
                    ),
                )
            }
            AppError::Store(e) => {
                error!("store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Config(msg) => {
                error!("configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}

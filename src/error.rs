//! Error types for the Reading Copilot server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::annotations::StoreError;
use crate::documents::DocumentError;
use crate::extraction::ExtractionError;
use crate::registry::RegistryError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Document(e) => (e.status_code(), e.error_type(), e.to_string()),
            AppError::Registry(e) => (e.status_code(), e.error_type(), e.to_string()),
            AppError::Extraction(e) => match e {
                ExtractionError::NotFound(path) => (
                    StatusCode::BAD_REQUEST,
                    "pdf_not_found",
                    format!("PDF not found: {}", path),
                ),
                ExtractionError::Open(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "invalid_pdf",
                    "The file could not be opened as a PDF".to_string(),
                ),
                _ => {
                    tracing::error!("Extraction error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "extraction_error",
                        "Text extraction failed".to_string(),
                    )
                }
            },
            AppError::Store(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

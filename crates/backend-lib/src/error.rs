// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::storage::StorageError;
use crate::validation::ValidationError;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Slot already reserved")]
    SlotConflict,

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SlotConflict => StatusCode::CONFLICT,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NF_001",
            AppError::SlotConflict => "SLOT_001",
            AppError::Storage(_) => "STORE_001",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Validation(_) => "VAL_002",
            AppError::RateLimitExceeded => "RATE_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::SlotConflict => {
                "This slot is already booked. Please choose another.".to_string()
            },
            AppError::Storage(_) => "An internal server error occurred".to_string(),
            // field-level messages carry no internal detail
            AppError::Validation(e) => e.to_string(),
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::RateLimitExceeded => {
                "Too many requests, please try again later.".to_string()
            },
        }
    }

    /// Whether the client should re-read availability before retrying
    pub fn requires_refresh(&self) -> bool {
        matches!(self, AppError::SlotConflict)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateReservation(_) => AppError::SlotConflict,
            StorageError::ExpertNotFound(id) => AppError::NotFound(format!("expert {id}")),
            other => AppError::Storage(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if status.is_server_error() {
            tracing::error!(code = error_code, error = %self, "request failed");
        }

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
                "refresh": self.requires_refresh(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

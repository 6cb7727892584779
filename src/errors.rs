use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Top-level application error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Store errors ─────────────────────────────────────────────────────────
    #[error("Database connection failed: {0}")]
    DatabaseConnectionFailed(#[source] sqlx::Error),

    #[error("Database query failed: {message}")]
    DatabaseQueryFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Stored exchange {row_id} is corrupt: {reason}")]
    CorruptRecord { row_id: i64, reason: String },

    #[error("Failed to encode exchange: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    // ── Generator errors ─────────────────────────────────────────────────────
    #[error("Model provider unavailable at {host}")]
    ProviderUnavailable { host: String },

    #[error("Generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("Invalid structured result: {message}")]
    InvalidResult { message: String },

    #[error("generator timed out after {secs}s")]
    GeneratorTimeout { secs: u64 },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },
}

impl AppError {
    pub fn db_query(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::DatabaseQueryFailed { message: message.into(), source }
    }

    pub fn invalid_result(message: impl Into<String>) -> Self {
        AppError::InvalidResult { message: message.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::EmptyField { .. } | AppError::FieldTooLong { .. })
    }

    /// Generator failures are recovered in-band by the streaming session.
    pub fn is_generator(&self) -> bool {
        matches!(
            self,
            AppError::ProviderUnavailable { .. }
                | AppError::GenerationFailed { .. }
                | AppError::InvalidResult { .. }
                | AppError::GeneratorTimeout { .. }
        )
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = if self.is_validation() {
            (StatusCode::BAD_REQUEST, "validation_error")
        } else if self.is_generator() {
            (StatusCode::BAD_GATEWAY, "generator_error")
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
        };
        let body = ErrorBody { error, message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

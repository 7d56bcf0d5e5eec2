//! # API Error Type
//!
//! Unified error type for agent HTTP handlers.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Handler ──► Result<T, ApiError>                                       │
//! │                  │                                                      │
//! │   ValidationError ─────────► 400 VALIDATION_ERROR                      │
//! │   malformed JSON body ─────► 400 VALIDATION_ERROR                      │
//! │   DbError::NotFound ───────► 404 NOT_FOUND                             │
//! │   Assignment / unique ─────► 409 CONFLICT                              │
//! │   other DbError ───────────► 500 DATABASE_ERROR                        │
//! │   anything else ───────────► 500 INTERNAL                              │
//! │                                                                         │
//! │  Body: { "code": "NOT_FOUND", "message": "Cache entry not found: k" }  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use gobus_db::DbError;
use gobus_sync::SyncError;

/// Error body returned by every failing request.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Bus or driver already assigned (409)
    Conflict,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(ErrorCode::ValidationError, rejection.body_text())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::Validation(e) => ApiError::new(ErrorCode::ValidationError, e.to_string()),
            e @ (DbError::AssignmentConflict { .. } | DbError::UniqueViolation { .. }) => {
                ApiError::new(ErrorCode::Conflict, e.to_string())
            }
            e => {
                // Log the actual error but return a generic message
                tracing::error!(error = %e, "Database operation failed");
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Validation(e) => ApiError::new(ErrorCode::ValidationError, e.to_string()),
            SyncError::Database(e) => ApiError::from(e),
            e => {
                tracing::error!(error = %e, "Offline service error");
                ApiError::new(ErrorCode::Internal, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gobus_core::ValidationError;

    #[test]
    fn test_error_mapping() {
        let err = ApiError::from(SyncError::Validation(ValidationError::Required {
            field: "endpoint".into(),
        }));
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.code.status(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(SyncError::Database(DbError::assignment_conflict("bus", "RAB-1")));
        assert_eq!(err.code, ErrorCode::Conflict);

        let err = ApiError::from(DbError::PoolExhausted);
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.message, "Database operation failed");
    }

    #[test]
    fn test_error_serialization() {
        let json = serde_json::to_value(ApiError::not_found("Cache entry", "routes")).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Cache entry not found: routes");
    }
}

//! # Error Types
//!
//! Domain-specific error types for gobus-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  gobus-core errors (this file)                                         │
//! │  ├── CoreError        - Parsing of stored enums, assignment rules      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  gobus-db errors      └── DbError     - Persistence failures           │
//! │  gobus-sync errors    └── SyncError   - Queue / replay / config        │
//! │  gobus-agent errors   └── ApiError    - What the front end sees        │
//! │                                                                         │
//! │  Flow: ValidationError → SyncError → ApiError → Front end              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Stored or submitted action kind is not recognised.
    #[error("Unknown action kind: {0}")]
    UnknownActionKind(String),

    /// Stored or submitted HTTP method is not recognised.
    #[error("Unknown HTTP method: {0}")]
    UnknownHttpMethod(String),

    /// Stored assignment status is not recognised.
    #[error("Unknown assignment status: {0}")]
    UnknownAssignmentStatus(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before anything touches the durable store, so a rejected enqueue
/// never leaves a partial row behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g. endpoint that is neither a path nor a URL).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Field is not allowed for this kind of request.
    #[error("{field} is not allowed: {reason}")]
    NotAllowed { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

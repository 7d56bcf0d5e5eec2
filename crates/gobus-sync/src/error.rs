//! # Sync Error Types
//!
//! Error types for queue, cache, replay and configuration operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Input       │  │     Storage             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Validation     │  │  Database               │ │
//! │  │  InvalidUrl     │  │                 │  │  SerializationFailed    │ │
//! │  │  ConfigLoad/Save│  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────┐  ┌─────────────────────────┐ │
//! │  │  Replay (never reach the enqueuer)  │  │      Lifecycle          │ │
//! │  │                                     │  │                         │ │
//! │  │  HttpStatus      RequestFailed      │  │  Internal               │ │
//! │  │  Timeout         MissingEndpoint    │  │                         │ │
//! │  └─────────────────────────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use gobus_core::ValidationError;
use gobus_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid offline configuration.
    #[error("Invalid offline configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API or probe URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Input Errors
    // =========================================================================
    /// Enqueue or cache request rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Durable store failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Failed to serialize or deserialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Replay Errors
    // =========================================================================
    /// Server answered with a non-2xx status.
    #[error("{method} {url} returned HTTP {status}")]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
    },

    /// Request could not be sent or the response could not be read.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Replay did not finish in time.
    #[error("Replay timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// A remote call is missing its endpoint or method.
    #[error("Queued action {id} has no endpoint or method")]
    MissingEndpoint { id: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::RequestFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if a later replay of the same action might succeed.
    ///
    /// The sync engine counts every replay failure against the retry budget;
    /// this only decides how loudly the failure is logged.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            SyncError::RequestFailed(_) | SyncError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this error came from replaying an action.
    pub fn is_replay_failure(&self) -> bool {
        matches!(
            self,
            SyncError::HttpStatus { .. }
                | SyncError::RequestFailed(_)
                | SyncError::Timeout { .. }
                | SyncError::MissingEndpoint { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

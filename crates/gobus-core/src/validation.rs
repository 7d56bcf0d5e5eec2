//! # Validation Module
//!
//! Input validation for enqueue and cache requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Front end (TypeScript)                                       │
//! │  └── Builds NewAction from the generated bindings                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Agent API / OfflineService (Rust)                            │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: shape rules per action kind, key and ttl limits      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraint on kind                                          │
//! │  └── Partial UNIQUE indexes on active assignments                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use gobus_core::validation::{validate_cache_key, validate_new_action};
//! use gobus_core::{HttpMethod, NewAction};
//!
//! let action = NewAction::remote_call(HttpMethod::Post, "/bookings", serde_json::json!({}));
//! assert!(validate_new_action(&action).is_ok());
//! assert!(validate_cache_key("").is_err());
//! ```

use std::time::Duration;

use crate::error::ValidationError;
use crate::types::{ActionKind, NewAction};
use crate::{MAX_CACHE_KEY_LEN, MAX_RETRIES_LIMIT};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Action Validators
// =============================================================================

/// Validates an enqueue request.
///
/// ## Rules
/// - `remote_call` needs both `method` and a valid `endpoint`
/// - `local_only` must carry neither
/// - `max_retries`, when given, lies in `1..=100`
pub fn validate_new_action(action: &NewAction) -> ValidationResult<()> {
    match action.kind {
        ActionKind::RemoteCall => {
            let endpoint = action
                .endpoint
                .as_deref()
                .ok_or_else(|| ValidationError::Required {
                    field: "endpoint".to_string(),
                })?;
            validate_endpoint(endpoint)?;

            if action.method.is_none() {
                return Err(ValidationError::Required {
                    field: "method".to_string(),
                });
            }
        }
        ActionKind::LocalOnly => {
            if action.endpoint.is_some() {
                return Err(ValidationError::NotAllowed {
                    field: "endpoint".to_string(),
                    reason: "local_only actions make no network call".to_string(),
                });
            }
            if action.method.is_some() {
                return Err(ValidationError::NotAllowed {
                    field: "method".to_string(),
                    reason: "local_only actions make no network call".to_string(),
                });
            }
        }
    }

    if let Some(max_retries) = action.max_retries {
        validate_max_retries(max_retries)?;
    }

    Ok(())
}

/// Validates a remote-call endpoint.
///
/// ## Rules
/// - Must not be empty or contain whitespace
/// - Must be a path starting with `/` or an absolute `http(s)://` URL
///
/// ## Example
/// ```rust
/// use gobus_core::validation::validate_endpoint;
///
/// assert!(validate_endpoint("/bookings").is_ok());
/// assert!(validate_endpoint("https://api.gobus.rw/payments").is_ok());
/// assert!(validate_endpoint("bookings").is_err());
/// ```
pub fn validate_endpoint(endpoint: &str) -> ValidationResult<()> {
    if endpoint.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "endpoint".to_string(),
        });
    }

    if endpoint.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "endpoint".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    let is_path = endpoint.starts_with('/');
    let is_url = endpoint.starts_with("http://") || endpoint.starts_with("https://");
    if !is_path && !is_url {
        return Err(ValidationError::InvalidFormat {
            field: "endpoint".to_string(),
            reason: "must start with '/' or be an absolute http(s) URL".to_string(),
        });
    }

    Ok(())
}

/// Validates a retry ceiling.
pub fn validate_max_retries(max_retries: u32) -> ValidationResult<()> {
    if max_retries == 0 || max_retries > MAX_RETRIES_LIMIT {
        return Err(ValidationError::OutOfRange {
            field: "max_retries".to_string(),
            min: 1,
            max: MAX_RETRIES_LIMIT as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Cache Validators
// =============================================================================

/// Validates a cache key.
///
/// ## Rules
/// - Must not be empty
/// - At most 256 characters
pub fn validate_cache_key(key: &str) -> ValidationResult<()> {
    if key.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "key".to_string(),
        });
    }

    if key.chars().count() > MAX_CACHE_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: "key".to_string(),
            max: MAX_CACHE_KEY_LEN,
        });
    }

    Ok(())
}

/// Validates a cache time-to-live. Zero would expire on write.
pub fn validate_ttl(ttl: Duration) -> ValidationResult<()> {
    if ttl.is_zero() {
        return Err(ValidationError::MustBePositive {
            field: "ttl".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an opaque identifier such as a bus or driver id.
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

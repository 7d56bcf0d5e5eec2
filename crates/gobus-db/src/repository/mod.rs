//! # Repository Module
//!
//! Database repository implementations for the offline store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  ActionQueue (gobus-sync)                                              │
//! │       │                                                                 │
//! │       │  db.action_queue().insert(&action)                             │
//! │       ▼                                                                 │
//! │  ActionQueueRepository                                                 │
//! │  ├── insert(&self, action)                                             │
//! │  ├── update(&self, action)                                             │
//! │  ├── delete(&self, id)                                                 │
//! │  └── list_all(&self)                                                   │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timestamps cross this boundary as `DateTime<Utc>` and are stored as
//! INTEGER milliseconds; see [`to_millis`] / [`from_millis`].
//!
//! ## Available Repositories
//!
//! - [`action_queue::ActionQueueRepository`] - Durable FIFO of deferred calls
//! - [`cache::CacheRepository`] - Response cache with expiry
//! - [`session::SessionRepository`] - Bearer credential storage
//! - [`assignment::AssignmentRepository`] - Bus/driver assignments

use chrono::{DateTime, Utc};

use crate::error::{DbError, DbResult};

pub mod action_queue;
pub mod assignment;
pub mod cache;
pub mod session;

/// Converts a timestamp to its stored form.
#[inline]
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Converts a stored timestamp back, rejecting out-of-range values.
pub fn from_millis(millis: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::Decode(format!("timestamp out of range: {millis}")))
}

/// Converts a stored non-negative counter back.
pub(crate) fn to_u32(field: &str, value: i64) -> DbResult<u32> {
    u32::try_from(value).map_err(|_| DbError::Decode(format!("{field} out of range: {value}")))
}

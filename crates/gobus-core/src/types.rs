//! # Domain Types
//!
//! Core domain types used throughout the GoBus offline subsystem.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  QueuedAction   │   │   CacheEntry    │   │  BusAssignment  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (ms+rand)   │   │  key            │   │  id (UUID)      │       │
//! │  │  kind           │   │  value (JSON)   │   │  bus_id         │       │
//! │  │  endpoint       │   │  stored_at      │   │  driver_id      │       │
//! │  │  method         │   │  expires_at     │   │  status         │       │
//! │  │  retry_count    │   └─────────────────┘   └─────────────────┘       │
//! │  │  max_retries    │                                                    │
//! │  └─────────────────┘   ┌─────────────────┐   ┌─────────────────┐       │
//! │                        │   ActionKind    │   │   HttpMethod    │       │
//! │  ┌─────────────────┐   │  ─────────────  │   │  ─────────────  │       │
//! │  │   QueueStatus   │   │  RemoteCall     │   │  GET POST PUT   │       │
//! │  │  total, pending │   │  LocalOnly      │   │  PATCH DELETE   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Action Lifecycle
//! ```text
//!   NewAction ──enqueue──► QueuedAction(retry_count = 0)
//!                              │
//!                 ┌────────────┼─────────────────┐
//!                 ▼            ▼                 ▼
//!             2xx reply    failure,          failure,
//!             (removed)    retry < max       retry >= max
//!                          (re-persisted)    (dropped)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreError;
use crate::ACTION_ID_SUFFIX_LEN;

// =============================================================================
// Action Kind
// =============================================================================

/// What replaying an action means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ActionKind {
    /// Replayed as an HTTP request against the GoBus API.
    RemoteCall,
    /// No network call; handed to a local handler if one is registered.
    LocalOnly,
}

impl ActionKind {
    /// Stable string form used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RemoteCall => "remote_call",
            ActionKind::LocalOnly => "local_only",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote_call" => Ok(ActionKind::RemoteCall),
            "local_only" => Ok(ActionKind::LocalOnly),
            other => Err(CoreError::UnknownActionKind(other.to_string())),
        }
    }
}

// =============================================================================
// HTTP Method
// =============================================================================

/// HTTP verb used when replaying a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = CoreError;

    /// Accepts any casing (`post`, `Post`, `POST`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(CoreError::UnknownHttpMethod(s.to_string())),
        }
    }
}

// =============================================================================
// Queued Action
// =============================================================================

/// A side-effecting operation deferred until the device is back online.
///
/// Created only through the action queue, which assigns `id`, `enqueued_at`
/// and `retry_count`. Owned exclusively by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QueuedAction {
    /// Millisecond timestamp plus a random suffix, e.g. `1760000000000-3f9a0c1be`.
    pub id: String,

    pub kind: ActionKind,

    /// Path relative to the API base URL, or an absolute http(s) URL.
    /// Present only for remote calls.
    pub endpoint: Option<String>,

    /// Present only for remote calls.
    pub method: Option<HttpMethod>,

    /// Opaque JSON request body.
    #[ts(type = "unknown")]
    pub payload: Option<serde_json::Value>,

    /// Creation time, never changes.
    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,

    /// Failed replay attempts so far.
    pub retry_count: u32,

    /// Attempts allowed before the action is dropped.
    pub max_retries: u32,
}

impl QueuedAction {
    /// True once the action has used up its retry budget.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// True if the next sweep would send this action over the network.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.kind == ActionKind::RemoteCall && !self.is_exhausted()
    }

    /// Records a failed attempt and reports whether the action is now exhausted.
    pub fn record_failure(&mut self) -> bool {
        self.retry_count = self.retry_count.saturating_add(1);
        self.is_exhausted()
    }
}

/// Request to enqueue an action. Fields the queue assigns are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewAction {
    pub kind: ActionKind,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub method: Option<HttpMethod>,

    #[serde(default)]
    #[ts(type = "unknown")]
    pub payload: Option<serde_json::Value>,

    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl NewAction {
    /// Builds a remote-call request with a JSON body.
    pub fn remote_call(
        method: HttpMethod,
        endpoint: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        NewAction {
            kind: ActionKind::RemoteCall,
            endpoint: Some(endpoint.into()),
            method: Some(method),
            payload: Some(payload),
            max_retries: None,
        }
    }

    /// Builds a local-only request.
    pub fn local_only(payload: serde_json::Value) -> Self {
        NewAction {
            kind: ActionKind::LocalOnly,
            endpoint: None,
            method: None,
            payload: Some(payload),
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Turns a validated request into a fresh queued action.
    pub fn into_queued(self, id: String, now: DateTime<Utc>, default_max_retries: u32) -> QueuedAction {
        QueuedAction {
            id,
            kind: self.kind,
            endpoint: self.endpoint,
            method: self.method,
            payload: self.payload,
            enqueued_at: now,
            retry_count: 0,
            max_retries: self.max_retries.unwrap_or(default_max_retries),
        }
    }
}

/// Generates an action id from the enqueue time and a random suffix.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use gobus_core::generate_action_id;
///
/// let id = generate_action_id(Utc::now());
/// let (millis, suffix) = id.split_once('-').unwrap();
/// assert!(millis.parse::<i64>().is_ok());
/// assert_eq!(suffix.len(), 9);
/// ```
pub fn generate_action_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        now.timestamp_millis(),
        &random[..ACTION_ID_SUFFIX_LEN]
    )
}

// =============================================================================
// Queue Status
// =============================================================================

/// Aggregate counts shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueueStatus {
    /// Every queued action.
    pub total: usize,
    /// Actions the next sweep will attempt over the network.
    pub pending: usize,
}

impl QueueStatus {
    pub fn from_actions<'a>(actions: impl IntoIterator<Item = &'a QueuedAction>) -> Self {
        actions
            .into_iter()
            .fold(QueueStatus::default(), |mut status, action| {
                status.total += 1;
                if action.is_pending() {
                    status.pending += 1;
                }
                status
            })
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A previously fetched server response kept for offline reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CacheEntry {
    pub key: String,

    #[ts(type = "unknown")]
    pub value: serde_json::Value,

    #[ts(as = "String")]
    pub stored_at: DateTime<Utc>,

    /// `stored_at + ttl`.
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry is stale strictly after `expires_at`.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// =============================================================================
// Bus Assignment
// =============================================================================

/// Whether an assignment is still in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AssignmentStatus {
    Active,
    Ended,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Ended => "ended",
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AssignmentStatus::Active),
            "ended" => Ok(AssignmentStatus::Ended),
            other => Err(CoreError::UnknownAssignmentStatus(other.to_string())),
        }
    }
}

/// A driver assigned to a bus.
///
/// At most one active assignment exists per bus and per driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BusAssignment {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub bus_id: String,
    pub driver_id: String,
    pub status: AssignmentStatus,
    #[ts(as = "String")]
    pub assigned_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl BusAssignment {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

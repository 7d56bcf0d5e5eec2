//! # gobus-core: Pure Domain Types for GoBus Offline Sync
//!
//! This crate holds the domain model shared by the persistence layer, the
//! sync engine and the local agent API. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     GoBus Offline Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Web / Mobile Front End (React)                     │   │
//! │  │   Booking screens ──► queue_action    Trip lists ──► cache_data │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP (loopback)                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 gobus-agent / gobus-sync                        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ gobus-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   clock   │  │ validation│  │   error   │  │   │
//! │  │   │QueuedActn │  │  Clock    │  │   rules   │  │ CoreError │  │   │
//! │  │   │CacheEntry │  │ManualClock│  │  checks   │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    gobus-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (QueuedAction, CacheEntry, BusAssignment, ...)
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation for enqueue and cache requests
//!
//! ## Example Usage
//!
//! ```rust
//! use gobus_core::{HttpMethod, NewAction};
//!
//! let booking = NewAction::remote_call(
//!     HttpMethod::Post,
//!     "/bookings",
//!     serde_json::json!({ "tripId": 42, "seat": "3A" }),
//! )
//! .with_max_retries(5);
//!
//! assert_eq!(booking.max_retries, Some(5));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Retry ceiling applied when an enqueue request does not specify one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound accepted for `max_retries` on a single action.
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Maximum length of a cache key.
pub const MAX_CACHE_KEY_LEN: usize = 256;

/// Length of the random suffix appended to action ids.
pub const ACTION_ID_SUFFIX_LEN: usize = 9;

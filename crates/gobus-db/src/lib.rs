//! # gobus-db: Database Layer for GoBus Offline Sync
//!
//! Local persistence for the offline subsystem. SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      GoBus Offline Data Flow                            │
//! │                                                                         │
//! │  OfflineService (queue_action, cache_data, set_auth_token)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     gobus-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │    Repositories    │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ ActionQueueRepo    │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ CacheRepo          │  │ 001_...sql │  │   │
//! │  │   │ Connection    │    │ SessionRepo        │  │ 002_...sql │  │   │
//! │  │   │ Management    │    │ AssignmentRepo     │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/gobus/offline.db                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gobus_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("offline.db")).await?;
//! let actions = db.action_queue().list_all().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::action_queue::ActionQueueRepository;
pub use repository::assignment::AssignmentRepository;
pub use repository::cache::CacheRepository;
pub use repository::session::SessionRepository;

//! # gobus-sync: Offline Queue & Sync Engine for GoBus
//!
//! Defers side-effecting API calls while the device is offline and replays
//! them against the GoBus REST API when connectivity returns. Also keeps a
//! TTL cache of server responses for offline browsing.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Offline Service                                 │
//! │                                                                         │
//! │  queue_action() ──► ActionQueue ──► SQLite queued_actions               │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  ConnectivityMonitor ─► RunLoop ──► SyncEngine ──► ActionReplayer ──► API
//! │   ▲          ▲          │                │                              │
//! │   │          │          │                └── SyncEventEmitter           │
//! │   │     ProbeLoop       └── CacheStore::clear_expired                   │
//! │   │    (HttpProbe)                                                      │
//! │  set_online()                                                           │
//! │                                                                         │
//! │  cache_data() / get_cached_data() ──► CacheStore ──► SQLite cache_entries
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - `OfflineConfig` (TOML + environment)
//! - [`queue`] - Durable FIFO with in-memory mirror
//! - [`cache`] - TTL response cache
//! - [`connectivity`] - Online flag, probes and the probe loop
//! - [`replay`] - HTTP replayer, credentials, local-action hook
//! - [`engine`] - Sweep with retry/drop policy
//! - [`events`] - Event emitter hooks
//! - [`service`] - `OfflineService` and its builder
//! - [`error`] - Sync error types
//!
//! ## Delivery Semantics
//! At-least-once. A replay that reached the server but whose response was
//! lost is retried, so server endpoints are expected to tolerate repeats.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod events;
pub mod queue;
pub mod replay;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::CacheStore;
pub use config::OfflineConfig;
pub use connectivity::{ConnectivityMonitor, HttpProbe, NetworkProbe, Transition};
pub use engine::{SkipReason, SweepOutcome, SweepReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use events::{NoOpEmitter, SyncEventEmitter};
pub use queue::ActionQueue;
pub use replay::{ActionReplayer, CredentialSource, HttpReplayer, LocalActionHandler};
pub use service::{OfflineService, OfflineServiceBuilder};

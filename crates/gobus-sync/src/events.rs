//! # Sync Events
//!
//! Hooks through which the front end learns about things the queue API
//! does not return, chiefly actions dropped after exhausting their retries.

use gobus_core::QueuedAction;

use crate::engine::SweepReport;
use crate::error::SyncError;

/// Receives sync lifecycle events.
pub trait SyncEventEmitter: Send + Sync {
    /// An action used up its retries and was removed from the queue.
    fn action_dropped(&self, action: &QueuedAction, last_error: &SyncError);

    /// A sweep ran to completion.
    fn sweep_completed(&self, report: &SweepReport);

    /// The online flag changed.
    fn connectivity_changed(&self, online: bool);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn action_dropped(&self, _action: &QueuedAction, _last_error: &SyncError) {}
    fn sweep_completed(&self, _report: &SweepReport) {}
    fn connectivity_changed(&self, _online: bool) {}
}

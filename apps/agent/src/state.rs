//! # Agent State
//!
//! Shared state handed to every handler, plus the event emitter that turns
//! sync events into log lines and counters the status endpoint reports.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use gobus_core::QueuedAction;
use gobus_sync::{OfflineService, SweepReport, SyncError, SyncEventEmitter};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OfflineService>,
    pub events: Arc<AgentEventEmitter>,
}

impl AppState {
    pub fn new(service: Arc<OfflineService>, events: Arc<AgentEventEmitter>) -> Self {
        AppState { service, events }
    }
}

/// Counts dropped actions so the front end can surface them.
#[derive(Debug, Default)]
pub struct AgentEventEmitter {
    dropped: AtomicU64,
}

impl AgentEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions dropped since the agent started.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SyncEventEmitter for AgentEventEmitter {
    fn action_dropped(&self, action: &QueuedAction, last_error: &SyncError) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            id = %action.id,
            endpoint = ?action.endpoint,
            error = %last_error,
            "Queued action abandoned"
        );
    }

    fn sweep_completed(&self, report: &SweepReport) {
        debug!(?report, "Sweep completed");
    }

    fn connectivity_changed(&self, online: bool) {
        debug!(online, "Connectivity changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gobus_core::{HttpMethod, NewAction};
    use serde_json::json;

    #[test]
    fn test_dropped_counter() {
        let emitter = AgentEventEmitter::new();
        let action = NewAction::remote_call(HttpMethod::Post, "/bookings", json!({}))
            .into_queued("1-a".into(), chrono::Utc::now(), 3);

        emitter.action_dropped(&action, &SyncError::Timeout { after_ms: 5000 });
        emitter.action_dropped(&action, &SyncError::Timeout { after_ms: 5000 });
        assert_eq!(emitter.dropped_total(), 2);
    }
}

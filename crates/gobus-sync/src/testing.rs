//! Scripted replayers and emitters shared by the unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use gobus_core::QueuedAction;

use crate::engine::SweepReport;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEventEmitter;
use crate::replay::ActionReplayer;

/// Records endpoints in call order and fails the scripted ones with a 503.
#[derive(Default)]
pub(crate) struct FakeReplayer {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl FakeReplayer {
    pub(crate) fn failing(endpoints: &[&str]) -> Self {
        FakeReplayer {
            calls: Mutex::new(Vec::new()),
            failing: endpoints.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionReplayer for FakeReplayer {
    async fn replay(&self, action: &QueuedAction) -> SyncResult<()> {
        let endpoint = action.endpoint.clone().unwrap_or_default();
        self.calls.lock().unwrap().push(endpoint.clone());

        if self.failing.contains(&endpoint) {
            return Err(SyncError::HttpStatus {
                method: "POST".into(),
                url: endpoint,
                status: 503,
            });
        }
        Ok(())
    }
}

/// Succeeds after `delay`, signalling `started` when a replay begins.
pub(crate) struct SlowReplayer {
    delay: Duration,
    pub(crate) started: Notify,
}

impl SlowReplayer {
    pub(crate) fn new(delay: Duration) -> Self {
        SlowReplayer {
            delay,
            started: Notify::new(),
        }
    }
}

#[async_trait]
impl ActionReplayer for SlowReplayer {
    async fn replay(&self, _action: &QueuedAction) -> SyncResult<()> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Keeps every event for later assertions.
#[derive(Default)]
pub(crate) struct RecordingEmitter {
    dropped: Mutex<Vec<String>>,
    sweeps: Mutex<Vec<SweepReport>>,
    connectivity: Mutex<Vec<bool>>,
}

impl RecordingEmitter {
    pub(crate) fn dropped(&self) -> Vec<String> {
        self.dropped.lock().unwrap().clone()
    }

    pub(crate) fn sweeps(&self) -> Vec<SweepReport> {
        self.sweeps.lock().unwrap().clone()
    }

    pub(crate) fn connectivity(&self) -> Vec<bool> {
        self.connectivity.lock().unwrap().clone()
    }
}

impl SyncEventEmitter for RecordingEmitter {
    fn action_dropped(&self, action: &QueuedAction, _last_error: &SyncError) {
        self.dropped.lock().unwrap().push(action.id.clone());
    }

    fn sweep_completed(&self, report: &SweepReport) {
        self.sweeps.lock().unwrap().push(*report);
    }

    fn connectivity_changed(&self, online: bool) {
        self.connectivity.lock().unwrap().push(online);
    }
}

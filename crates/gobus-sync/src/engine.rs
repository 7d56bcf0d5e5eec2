//! # Sync Engine
//!
//! Drains the action queue against the API while online.
//!
//! ## Sweep
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sync_queue()                                                          │
//! │                                                                         │
//! │  offline?  ──► Skipped(Offline)                                        │
//! │  empty?    ──► Skipped(Empty)                                          │
//! │  running?  ──► Skipped(Busy)                                           │
//! │                                                                         │
//! │  for action in snapshot (FIFO, one at a time):                         │
//! │     local_only, no handler ─────────────► skipped (left untouched)     │
//! │     replay under timeout                                               │
//! │       ├── Ok            ──► remove(id)                     succeeded   │
//! │       └── Err / timeout ──► retry_count += 1                           │
//! │                 ├── retry_count >= max ──► remove + action_dropped     │
//! │                 └── otherwise          ──► update(action)   retried    │
//! │                                                                         │
//! │  Replay and persistence failures are logged, never returned.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use ts_rs::TS;

use gobus_core::{ActionKind, QueuedAction};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::events::{NoOpEmitter, SyncEventEmitter};
use crate::queue::ActionQueue;
use crate::replay::{ActionReplayer, LocalActionHandler};

/// Default bound on a single replay.
pub const DEFAULT_REPLAY_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Sweep Results
// =============================================================================

/// Counts from one completed sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct SweepReport {
    /// Actions handed to a replayer or local handler.
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed but still within their retry budget.
    pub retried: usize,
    /// Failed for the last time and removed.
    pub dropped: usize,
    /// Local-only actions with no handler registered.
    pub skipped: usize,
}

/// Why a sweep did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SkipReason {
    Offline,
    Empty,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
#[ts(export)]
pub enum SweepOutcome {
    Completed { report: SweepReport },
    Skipped { reason: SkipReason },
}

impl SweepOutcome {
    pub fn report(&self) -> Option<&SweepReport> {
        match self {
            SweepOutcome::Completed { report } => Some(report),
            SweepOutcome::Skipped { .. } => None,
        }
    }
}

/// Clears the running flag when a sweep ends, however it ends.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct SyncEngine {
    queue: Arc<ActionQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    replayer: Arc<dyn ActionReplayer>,
    local_handler: Option<Arc<dyn LocalActionHandler>>,
    emitter: Arc<dyn SyncEventEmitter>,
    replay_timeout: Duration,
    running: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<ActionQueue>,
        connectivity: Arc<ConnectivityMonitor>,
        replayer: Arc<dyn ActionReplayer>,
    ) -> Self {
        SyncEngine {
            queue,
            connectivity,
            replayer,
            local_handler: None,
            emitter: Arc::new(NoOpEmitter),
            replay_timeout: DEFAULT_REPLAY_TIMEOUT,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_local_handler(mut self, handler: Arc<dyn LocalActionHandler>) -> Self {
        self.local_handler = Some(handler);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_replay_timeout(mut self, timeout: Duration) -> Self {
        self.replay_timeout = timeout;
        self
    }

    /// True while a sweep is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one sweep over a snapshot of the queue.
    pub async fn sync_queue(&self) -> SweepOutcome {
        if !self.connectivity.is_online() {
            debug!("Sync skipped: offline");
            return SweepOutcome::Skipped {
                reason: SkipReason::Offline,
            };
        }

        if self.queue.is_empty().await {
            return SweepOutcome::Skipped {
                reason: SkipReason::Empty,
            };
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync skipped: sweep already running");
            return SweepOutcome::Skipped {
                reason: SkipReason::Busy,
            };
        }
        let _guard = SweepGuard(&self.running);

        let snapshot = self.queue.snapshot().await;
        info!(count = snapshot.len(), "Sync sweep starting");

        let mut report = SweepReport::default();
        for action in snapshot {
            // Left behind when the removal after the last attempt failed.
            if action.is_exhausted() {
                match self.queue.remove(&action.id).await {
                    Ok(()) => warn!(id = %action.id, "Purged exhausted action without replay"),
                    Err(e) => error!(id = %action.id, error = %e, "Failed to purge exhausted action"),
                }
                continue;
            }

            let result = match action.kind {
                ActionKind::RemoteCall => self.bounded(self.replayer.replay(&action)).await,
                ActionKind::LocalOnly => match self.local_handler {
                    Some(ref handler) => self.bounded(handler.handle(&action)).await,
                    None => {
                        report.skipped += 1;
                        continue;
                    }
                },
            };
            report.attempted += 1;

            match result {
                Ok(()) => {
                    if let Err(e) = self.queue.remove(&action.id).await {
                        error!(id = %action.id, error = %e, "Failed to remove synced action");
                    }
                    debug!(id = %action.id, "Action synced");
                    report.succeeded += 1;
                }
                Err(err) => self.record_failure(action, err, &mut report).await,
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            retried = report.retried,
            dropped = report.dropped,
            "Sync sweep finished"
        );
        self.emitter.sweep_completed(&report);

        SweepOutcome::Completed { report }
    }

    async fn bounded(&self, replay: impl Future<Output = SyncResult<()>>) -> SyncResult<()> {
        match tokio::time::timeout(self.replay_timeout, replay).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                after_ms: self.replay_timeout.as_millis() as u64,
            }),
        }
    }

    async fn record_failure(&self, mut action: QueuedAction, err: SyncError, report: &mut SweepReport) {
        let exhausted = action.record_failure();

        if exhausted {
            warn!(
                id = %action.id,
                endpoint = ?action.endpoint,
                attempts = action.retry_count,
                error = %err,
                "Action dropped after exhausting retries"
            );
            if let Err(e) = self.queue.remove(&action.id).await {
                error!(id = %action.id, error = %e, "Failed to remove exhausted action");
            }
            self.emitter.action_dropped(&action, &err);
            report.dropped += 1;
            return;
        }

        if err.is_retryable() {
            debug!(id = %action.id, retry_count = action.retry_count, error = %err, "Replay failed");
        } else {
            warn!(id = %action.id, retry_count = action.retry_count, error = %err, "Replay rejected");
        }

        match self.queue.update(&action).await {
            Ok(()) => {}
            Err(SyncError::Database(gobus_db::DbError::NotFound { .. })) => {
                debug!(id = %action.id, "Action removed during sweep");
            }
            Err(e) => error!(id = %action.id, error = %e, "Failed to persist retry count"),
        }
        report.retried += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeReplayer, RecordingEmitter, SlowReplayer};
    use async_trait::async_trait;
    use gobus_core::{HttpMethod, NewAction, SystemClock};
    use gobus_db::{Database, DbConfig};
    use serde_json::json;

    struct Harness {
        db: Database,
        queue: Arc<ActionQueue>,
        connectivity: Arc<ConnectivityMonitor>,
    }

    async fn harness(online: bool) -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = Arc::new(ActionQueue::new(db.action_queue(), Arc::new(SystemClock), 3));
        Harness {
            db,
            queue,
            connectivity: Arc::new(ConnectivityMonitor::new(online)),
        }
    }

    impl Harness {
        fn engine(&self, replayer: Arc<dyn ActionReplayer>) -> SyncEngine {
            SyncEngine::new(self.queue.clone(), self.connectivity.clone(), replayer)
        }
    }

    fn call(endpoint: &str) -> NewAction {
        NewAction::remote_call(HttpMethod::Post, endpoint, json!({"seat": "3A"}))
    }

    #[tokio::test]
    async fn test_success_removes_action() {
        let h = harness(true).await;
        let replayer = Arc::new(FakeReplayer::default());
        let engine = h.engine(replayer.clone());

        h.queue.enqueue(call("/bookings")).await.unwrap();
        let id = h.queue.enqueue(call("/payments")).await.unwrap();
        let before = h.queue.status().await.total;

        let outcome = engine.sync_queue().await;
        assert_eq!(outcome.report().unwrap().succeeded, 2);
        assert_eq!(h.queue.status().await.total, before - 2);
        assert!(h.queue.list_all().await.unwrap().iter().all(|a| a.id != id));
    }

    #[tokio::test]
    async fn test_retry_ceiling_drops_after_max_attempts() {
        let h = harness(true).await;
        let replayer = Arc::new(FakeReplayer::failing(&["/bookings"]));
        let emitter = Arc::new(RecordingEmitter::default());
        let engine = h.engine(replayer.clone()).with_emitter(emitter.clone());

        let id = h.queue.enqueue(call("/bookings")).await.unwrap();

        for sweep in 1..=2 {
            let report = *engine.sync_queue().await.report().unwrap();
            assert_eq!(report.retried, 1);
            let stored = h.queue.list_all().await.unwrap();
            assert_eq!(stored[0].retry_count, sweep);
        }

        let report = *engine.sync_queue().await.report().unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(replayer.calls().len(), 3);
        assert!(h.queue.list_all().await.unwrap().is_empty());
        assert_eq!(emitter.dropped(), vec![id]);
        assert_eq!(emitter.sweeps().len(), 3);

        // Nothing left to attempt.
        assert_eq!(
            engine.sync_queue().await,
            SweepOutcome::Skipped { reason: SkipReason::Empty }
        );
        assert_eq!(replayer.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_leftover_is_purged_without_replay() {
        let h = harness(true).await;
        let replayer = Arc::new(FakeReplayer::default());
        let engine = h.engine(replayer.clone());

        h.queue.enqueue(call("/bookings")).await.unwrap();
        let mut leftover = h.queue.snapshot().await.remove(0);
        leftover.retry_count = leftover.max_retries;
        h.queue.update(&leftover).await.unwrap();
        h.queue.enqueue(call("/payments")).await.unwrap();

        let report = *engine.sync_queue().await.report().unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(replayer.calls(), vec!["/payments".to_string()]);
        assert!(h.queue.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_sweep_is_noop() {
        let h = harness(false).await;
        let replayer = Arc::new(FakeReplayer::failing(&["/bookings"]));
        let engine = h.engine(replayer.clone());
        h.queue.enqueue(call("/bookings")).await.unwrap();

        assert_eq!(
            engine.sync_queue().await,
            SweepOutcome::Skipped { reason: SkipReason::Offline }
        );
        assert!(replayer.calls().is_empty());
        let stored = h.queue.list_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let h = harness(true).await;
        let replayer = Arc::new(FakeReplayer::default());
        let engine = h.engine(replayer.clone());

        h.queue.enqueue(call("/a")).await.unwrap();
        h.queue.enqueue(call("/b")).await.unwrap();
        h.queue.enqueue(call("/c")).await.unwrap();
        engine.sync_queue().await;

        assert_eq!(replayer.calls(), vec!["/a", "/b", "/c"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_later_actions() {
        let h = harness(true).await;
        let replayer = Arc::new(FakeReplayer::failing(&["/a"]));
        let engine = h.engine(replayer.clone());

        h.queue.enqueue(call("/a")).await.unwrap();
        h.queue.enqueue(call("/b")).await.unwrap();
        let report = *engine.sync_queue().await.report().unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.retried, 1);
        assert_eq!(h.queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_sweeps_do_not_overlap() {
        let h = harness(true).await;
        let replayer = Arc::new(SlowReplayer::new(Duration::from_millis(300)));
        let engine = Arc::new(h.engine(replayer.clone()));
        h.queue.enqueue(call("/bookings")).await.unwrap();

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.sync_queue().await }
        });
        replayer.started.notified().await;

        assert!(engine.is_running());
        assert_eq!(
            engine.sync_queue().await,
            SweepOutcome::Skipped { reason: SkipReason::Busy }
        );

        let outcome = first.await.unwrap();
        assert_eq!(outcome.report().unwrap().succeeded, 1);
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let h = harness(true).await;
        let replayer = Arc::new(SlowReplayer::new(Duration::from_secs(10)));
        let engine = h
            .engine(replayer)
            .with_replay_timeout(Duration::from_millis(50));
        h.queue.enqueue(call("/bookings")).await.unwrap();

        let report = *engine.sync_queue().await.report().unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(h.queue.list_all().await.unwrap()[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_local_only_untouched_without_handler() {
        let h = harness(true).await;
        let replayer = Arc::new(FakeReplayer::default());
        let engine = h.engine(replayer.clone());
        h.queue.enqueue(NewAction::local_only(json!({"draft": 1}))).await.unwrap();

        let report = *engine.sync_queue().await.report().unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.attempted, 0);
        assert!(replayer.calls().is_empty());

        let stored = h.queue.list_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_local_handler_is_used_when_registered() {
        struct Accept;

        #[async_trait]
        impl LocalActionHandler for Accept {
            async fn handle(&self, _action: &QueuedAction) -> SyncResult<()> {
                Ok(())
            }
        }

        let h = harness(true).await;
        let engine = h
            .engine(Arc::new(FakeReplayer::default()))
            .with_local_handler(Arc::new(Accept));
        h.queue.enqueue(NewAction::local_only(json!({"draft": 1}))).await.unwrap();

        let report = *engine.sync_queue().await.report().unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(h.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_escape() {
        let h = harness(true).await;
        let replayer = Arc::new(FakeReplayer::failing(&["/a"]));
        let engine = h.engine(replayer.clone());
        h.queue.enqueue(call("/a")).await.unwrap();
        h.queue.enqueue(call("/b")).await.unwrap();

        h.db.close().await;

        let report = *engine.sync_queue().await.report().unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(replayer.calls(), vec!["/a", "/b"]);
    }
}

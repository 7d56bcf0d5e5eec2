//! # Offline Service
//!
//! Owns the queue, cache, connectivity monitor and sync engine, and runs the
//! background loop that ties them together.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OfflineServiceBuilder::new(config)                                    │
//! │      .with_database(db)            (required)                          │
//! │      .with_replayer(..)            default: HttpReplayer + session     │
//! │      .with_probe(..)               default: HttpProbe if probe_url     │
//! │      .build()                                                          │
//! │                                                                         │
//! │  start()                                                               │
//! │    1. reload the queue mirror from SQLite                              │
//! │    2. initial online flag: probe, or connectivity.assume_online        │
//! │    3. spawn RunLoop and ProbeLoop                                      │
//! │                                                                         │
//! │  RunLoop (tokio::select!)                                              │
//! │    • offline → online      ──► sync_queue()                            │
//! │    • sync interval tick    ──► sync_queue()     (no-op when offline)   │
//! │    • queue_action nudge    ──► sync_queue()     (coalesced, cap 1)     │
//! │    • cache sweep tick      ──► clear_expired()                         │
//! │    • shutdown              ──► exit after the current sweep            │
//! │                                                                         │
//! │  stop()  signal shutdown, await both tasks                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use gobus_core::{Clock, NewAction, QueueStatus, SystemClock};
use gobus_db::Database;

use crate::cache::CacheStore;
use crate::config::OfflineConfig;
use crate::connectivity::{
    ConnectivityMonitor, HttpProbe, NetworkProbe, ProbeLoop, ProbeSchedule, Transition,
};
use crate::engine::{SweepOutcome, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::events::{NoOpEmitter, SyncEventEmitter};
use crate::queue::ActionQueue;
use crate::replay::{ActionReplayer, HttpReplayer, LocalActionHandler, SessionCredentials};

// =============================================================================
// Service
// =============================================================================

struct RunningTasks {
    shutdown_txs: Vec<mpsc::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
    trigger_tx: mpsc::Sender<()>,
}

/// The offline subsystem, constructed once by the composition root.
pub struct OfflineService {
    config: Arc<OfflineConfig>,
    db: Database,
    queue: Arc<ActionQueue>,
    cache: Arc<CacheStore>,
    connectivity: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
    probe: Option<Arc<dyn NetworkProbe>>,
    emitter: Arc<dyn SyncEventEmitter>,
    tasks: Mutex<Option<RunningTasks>>,
}

impl OfflineService {
    pub fn builder(config: OfflineConfig) -> OfflineServiceBuilder {
        OfflineServiceBuilder::new(config)
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Starts background processing. Calling it again while running is a no-op.
    pub async fn start(&self) -> SyncResult<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            debug!("Offline service already running");
            return Ok(());
        }

        let loaded = self.queue.load().await?;

        if let Some(ref probe) = self.probe {
            self.connectivity.set_online(probe.is_reachable().await);
        }

        info!(
            queued = loaded,
            online = self.connectivity.is_online(),
            api = %self.config.api.base_url,
            "Starting offline service"
        );

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let run_loop = RunLoop {
            engine: self.engine.clone(),
            cache: self.cache.clone(),
            emitter: self.emitter.clone(),
            connectivity_rx: self.connectivity.subscribe(),
            trigger_rx,
            shutdown_rx,
            sync_interval: self.config.sync_interval(),
            cache_sweep_interval: self.config.cache_sweep_interval(),
        };

        let mut running = RunningTasks {
            shutdown_txs: vec![shutdown_tx],
            handles: vec![tokio::spawn(run_loop.run())],
            trigger_tx,
        };

        if let Some(ref probe) = self.probe {
            let connectivity = &self.config.connectivity;
            let schedule = ProbeSchedule {
                interval: Duration::from_secs(connectivity.probe_interval_secs),
                initial_backoff: Duration::from_millis(connectivity.initial_backoff_ms),
                max_backoff: Duration::from_secs(connectivity.max_backoff_secs),
            };
            let (probe_loop, probe_shutdown) =
                ProbeLoop::new(self.connectivity.clone(), probe.clone(), schedule);
            running.shutdown_txs.push(probe_shutdown);
            running.handles.push(tokio::spawn(probe_loop.run()));
        }

        *tasks = Some(running);
        Ok(())
    }

    /// Stops background processing and waits for it to finish.
    ///
    /// A sweep in progress runs to completion first. Idempotent.
    pub async fn stop(&self) -> SyncResult<()> {
        let Some(running) = self.tasks.lock().await.take() else {
            return Ok(());
        };

        info!("Stopping offline service");

        for tx in running.shutdown_txs {
            let _ = tx.send(()).await;
        }

        let mut failed = None;
        for handle in running.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Background task failed");
                failed = Some(SyncError::Internal(format!("background task failed: {e}")));
            }
        }

        info!("Offline service stopped");
        failed.map_or(Ok(()), Err)
    }

    pub async fn is_running(&self) -> bool {
        self.tasks.lock().await.is_some()
    }

    // =========================================================================
    // Enqueue API
    // =========================================================================

    /// Queues an action and, when online, nudges the run loop to sync.
    pub async fn queue_action(&self, action: NewAction) -> SyncResult<String> {
        let id = self.queue.enqueue(action).await?;

        if self.connectivity.is_online() {
            if let Some(ref running) = *self.tasks.lock().await {
                // Full means a sweep is already pending.
                let _ = running.trigger_tx.try_send(());
            }
        }

        Ok(id)
    }

    /// Runs a sweep now, independent of the background loop.
    pub async fn sync_queue(&self) -> SweepOutcome {
        self.engine.sync_queue().await
    }

    // =========================================================================
    // Cache API
    // =========================================================================

    /// Caches `value` under `key`. Uses the configured TTL when `ttl` is `None`.
    pub async fn cache_data(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> SyncResult<()> {
        let ttl = ttl.unwrap_or_else(|| self.config.default_cache_ttl());
        self.cache.put(key, value, ttl).await?;
        Ok(())
    }

    pub async fn get_cached_data(&self, key: &str) -> SyncResult<Option<serde_json::Value>> {
        self.cache.get(key).await
    }

    pub async fn clear_expired_cache(&self) -> SyncResult<u64> {
        self.cache.clear_expired().await
    }

    // =========================================================================
    // Status API
    // =========================================================================

    pub fn is_online_status(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Reports a platform connectivity event.
    pub fn set_online(&self, online: bool) -> Transition {
        self.connectivity.set_online(online)
    }

    pub async fn get_queue_status(&self) -> QueueStatus {
        self.queue.status().await
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Stores the bearer token for replayed calls, or clears it with `None`.
    pub async fn set_auth_token(&self, token: Option<String>) -> SyncResult<()> {
        self.db.session().set_auth_token(token.as_deref()).await?;
        Ok(())
    }
}

// =============================================================================
// Run Loop
// =============================================================================

struct RunLoop {
    engine: Arc<SyncEngine>,
    cache: Arc<CacheStore>,
    emitter: Arc<dyn SyncEventEmitter>,
    connectivity_rx: watch::Receiver<bool>,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
    sync_interval: Duration,
    cache_sweep_interval: Duration,
}

impl RunLoop {
    async fn run(mut self) {
        info!(interval = ?self.sync_interval, "Sync loop starting");

        let mut sync_tick = tokio::time::interval(self.sync_interval);
        sync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let now = Instant::now();
        let first_sweep = now.checked_add(self.cache_sweep_interval).unwrap_or(now);
        let mut cache_tick = tokio::time::interval_at(first_sweep, self.cache_sweep_interval);
        cache_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    break;
                }

                changed = self.connectivity_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *self.connectivity_rx.borrow_and_update();
                    self.emitter.connectivity_changed(online);
                    if online {
                        self.engine.sync_queue().await;
                    }
                }

                _ = sync_tick.tick() => {
                    self.engine.sync_queue().await;
                }

                Some(()) = self.trigger_rx.recv() => {
                    self.engine.sync_queue().await;
                }

                _ = cache_tick.tick() => {
                    if let Err(e) = self.cache.clear_expired().await {
                        error!(error = %e, "Cache sweep failed");
                    }
                }
            }
        }

        info!("Sync loop stopped");
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`OfflineService`].
pub struct OfflineServiceBuilder {
    config: OfflineConfig,
    db: Option<Database>,
    replayer: Option<Arc<dyn ActionReplayer>>,
    probe: Option<Arc<dyn NetworkProbe>>,
    clock: Option<Arc<dyn Clock>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
    local_handler: Option<Arc<dyn LocalActionHandler>>,
}

impl OfflineServiceBuilder {
    pub fn new(config: OfflineConfig) -> Self {
        OfflineServiceBuilder {
            config,
            db: None,
            replayer: None,
            probe: None,
            clock: None,
            emitter: None,
            local_handler: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_replayer(mut self, replayer: Arc<dyn ActionReplayer>) -> Self {
        self.replayer = Some(replayer);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn NetworkProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_local_handler(mut self, handler: Arc<dyn LocalActionHandler>) -> Self {
        self.local_handler = Some(handler);
        self
    }

    pub fn build(self) -> SyncResult<OfflineService> {
        self.config.validate()?;

        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;
        let config = Arc::new(self.config);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        let replayer = match self.replayer {
            Some(replayer) => replayer,
            None => Arc::new(HttpReplayer::new(
                &config.api.base_url,
                config.request_timeout(),
                Arc::new(SessionCredentials::new(db.session())),
            )?),
        };

        let probe = match (self.probe, config.connectivity.probe_url.as_deref()) {
            (Some(probe), _) => Some(probe),
            (None, Some(url)) => Some(Arc::new(HttpProbe::new(
                url,
                Duration::from_millis(config.connectivity.probe_timeout_ms),
            )?) as Arc<dyn NetworkProbe>),
            (None, None) => None,
        };

        let queue = Arc::new(ActionQueue::new(
            db.action_queue(),
            clock.clone(),
            config.queue.default_max_retries,
        ));
        let cache = Arc::new(CacheStore::new(db.cache(), clock));
        let connectivity = Arc::new(ConnectivityMonitor::new(config.connectivity.assume_online));

        let mut engine = SyncEngine::new(queue.clone(), connectivity.clone(), replayer)
            .with_emitter(emitter.clone())
            .with_replay_timeout(config.request_timeout());
        if let Some(handler) = self.local_handler {
            engine = engine.with_local_handler(handler);
        }

        Ok(OfflineService {
            config,
            db,
            queue,
            cache,
            connectivity,
            engine: Arc::new(engine),
            probe,
            emitter,
            tasks: Mutex::new(None),
        })
    }
}

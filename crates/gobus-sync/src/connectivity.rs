//! # Connectivity Monitor
//!
//! Tracks whether the device is online and publishes transitions.
//!
//! ## Sources of Truth
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Platform events ──► set_online(bool) ─┐                              │
//! │   (PUT /connectivity)                    │                              │
//! │                                          ▼                              │
//! │   ProbeLoop ───────► set_online(bool) ─► watch<bool> ──► run loop      │
//! │   (HttpProbe)                                           (sync on       │
//! │                                                          offline →     │
//! │                                                          online)       │
//! │                                                                         │
//! │   Probe schedule:                                                       │
//! │     online   every probe_interval                                      │
//! │     offline  1s, 2s, 4s ... capped at max_backoff                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::SyncResult;

// =============================================================================
// Monitor
// =============================================================================

/// Result of reporting a connectivity observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BecameOnline,
    BecameOffline,
    Unchanged,
}

/// Current online flag plus a change feed.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (online, _) = watch::channel(initially_online);
        ConnectivityMonitor { online }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Records an observation. Subscribers are only woken on a change.
    pub fn set_online(&self, online: bool) -> Transition {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        match (changed, online) {
            (false, _) => Transition::Unchanged,
            (true, true) => {
                info!("Connectivity restored");
                Transition::BecameOnline
            }
            (true, false) => {
                info!("Connectivity lost");
                Transition::BecameOffline
            }
        }
    }

    /// Receiver that observes every transition after this call.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}

// =============================================================================
// Network Probe
// =============================================================================

/// Answers "can the API be reached right now?".
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probe that issues a GET and treats any non-5xx reply as reachable.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpProbe {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) => !resp.status().is_server_error(),
            Err(e) => {
                debug!(url = %self.url, error = %e, "Probe failed");
                false
            }
        }
    }
}

// =============================================================================
// Probe Loop
// =============================================================================

/// Timing for [`ProbeLoop`].
#[derive(Debug, Clone)]
pub struct ProbeSchedule {
    pub interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ProbeSchedule {
    fn default() -> Self {
        ProbeSchedule {
            interval: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Background task that keeps the monitor in step with the probe.
pub struct ProbeLoop {
    monitor: Arc<ConnectivityMonitor>,
    probe: Arc<dyn NetworkProbe>,
    schedule: ProbeSchedule,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ProbeLoop {
    /// Creates the loop and the sender that stops it.
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        probe: Arc<dyn NetworkProbe>,
        schedule: ProbeSchedule,
    ) -> (Self, mpsc::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let probe_loop = ProbeLoop {
            monitor,
            probe,
            schedule,
            shutdown_rx,
        };
        (probe_loop, shutdown_tx)
    }

    pub async fn run(mut self) {
        info!(interval = ?self.schedule.interval, "Connectivity probe starting");

        let mut backoff = self.create_backoff();

        loop {
            let wait = if self.monitor.is_online() {
                backoff.reset();
                self.schedule.interval
            } else {
                backoff.next_backoff().unwrap_or(self.schedule.max_backoff)
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown_rx.recv() => {
                    break;
                }
            }

            let reachable = self.probe.is_reachable().await;
            if self.monitor.set_online(reachable) == Transition::BecameOffline {
                warn!(retry_in = ?self.schedule.initial_backoff, "API unreachable");
            }
        }

        info!("Connectivity probe stopped");
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.schedule.initial_backoff,
            max_interval: self.schedule.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        // Start the first interval at initial_backoff rather than the crate default.
        backoff.reset();
        backoff
    }
}

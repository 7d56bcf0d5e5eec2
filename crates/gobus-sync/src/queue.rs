//! # Action Queue
//!
//! Durable FIFO of deferred actions with an in-memory mirror.
//!
//! ## Write Ordering
//! ```text
//! enqueue(new)
//!   │
//!   ├── validate ───────────────► Err(Validation)
//!   │
//!   ├── lock mirror ─────────────┐
//!   │     INSERT queued_actions  │  durable write first
//!   │     mirror.push(action)    │  then mirror, under the same lock
//!   └── unlock ──────────────────┘
//! ```
//!
//! Holding the mirror lock across the durable write keeps mirror order equal
//! to durable order even when callers enqueue concurrently.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use gobus_core::validation::validate_new_action;
use gobus_core::{generate_action_id, Clock, NewAction, QueueStatus, QueuedAction};
use gobus_db::{ActionQueueRepository, DbError};

use crate::error::SyncResult;

/// Durable action queue.
pub struct ActionQueue {
    repo: ActionQueueRepository,
    mirror: Mutex<Vec<QueuedAction>>,
    clock: Arc<dyn Clock>,
    default_max_retries: u32,
}

impl ActionQueue {
    pub fn new(repo: ActionQueueRepository, clock: Arc<dyn Clock>, default_max_retries: u32) -> Self {
        ActionQueue {
            repo,
            mirror: Mutex::new(Vec::new()),
            clock,
            default_max_retries,
        }
    }

    /// Rebuilds the mirror from the durable store. Returns the action count.
    pub async fn load(&self) -> SyncResult<usize> {
        let mut mirror = self.mirror.lock().await;
        *mirror = self.repo.list_all().await?;

        info!(count = mirror.len(), "Action queue loaded");
        Ok(mirror.len())
    }

    /// Same as [`load`](Self::load); used after out-of-band changes.
    pub async fn reload(&self) -> SyncResult<usize> {
        self.load().await
    }

    /// Validates, persists and appends an action. Returns the new id.
    pub async fn enqueue(&self, new: NewAction) -> SyncResult<String> {
        validate_new_action(&new)?;

        let now = self.clock.now_millis();
        let action = new.into_queued(generate_action_id(now), now, self.default_max_retries);

        let mut mirror = self.mirror.lock().await;
        self.repo.insert(&action).await?;

        debug!(
            id = %action.id,
            kind = %action.kind,
            endpoint = ?action.endpoint,
            "Action enqueued"
        );

        let id = action.id.clone();
        mirror.push(action);
        Ok(id)
    }

    /// Removes an action. Removing an unknown id is a no-op.
    pub async fn remove(&self, id: &str) -> SyncResult<()> {
        let mut mirror = self.mirror.lock().await;
        let removed = self.repo.delete(id).await?;
        mirror.retain(|a| a.id != id);

        if removed {
            debug!(id = %id, "Action removed");
        }
        Ok(())
    }

    /// Overwrites a stored action's mutable fields.
    ///
    /// An id that is no longer stored is `NotFound` and is also dropped from
    /// the mirror, so a concurrent removal is never undone.
    pub async fn update(&self, action: &QueuedAction) -> SyncResult<()> {
        let mut mirror = self.mirror.lock().await;

        match self.repo.update(action).await {
            Ok(()) => {
                if let Some(slot) = mirror.iter_mut().find(|a| a.id == action.id) {
                    *slot = action.clone();
                }
                Ok(())
            }
            Err(err @ DbError::NotFound { .. }) => {
                mirror.retain(|a| a.id != action.id);
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Every stored action in insertion order, read from the durable store.
    pub async fn list_all(&self) -> SyncResult<Vec<QueuedAction>> {
        Ok(self.repo.list_all().await?)
    }

    /// Copy of the mirror in insertion order.
    pub async fn snapshot(&self) -> Vec<QueuedAction> {
        self.mirror.lock().await.clone()
    }

    pub async fn status(&self) -> QueueStatus {
        QueueStatus::from_actions(self.mirror.lock().await.iter())
    }

    pub async fn len(&self) -> usize {
        self.mirror.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.mirror.lock().await.is_empty()
    }
}

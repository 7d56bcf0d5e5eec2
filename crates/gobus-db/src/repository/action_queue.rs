//! # Action Queue Repository
//!
//! Durable storage for queued actions.
//!
//! ## Table Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  queued_actions                                                        │
//! │                                                                         │
//! │  seq │ id               │ kind        │ method │ endpoint   │ retry    │
//! │  ────┼──────────────────┼─────────────┼────────┼────────────┼───────   │
//! │   1  │ 1760...-3f9a0c1b │ remote_call │ POST   │ /bookings  │ 0 / 3    │
//! │   2  │ 1760...-a01be77c │ local_only  │        │            │ 0 / 3    │
//! │   3  │ 1760...-77d0e2f1 │ remote_call │ PUT    │ /wallet    │ 2 / 5    │
//! │                                                                         │
//! │  seq (AUTOINCREMENT) fixes insertion order, so list_all() is FIFO      │
//! │  even when two actions share the same enqueued_at millisecond.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use super::{from_millis, to_millis, to_u32};
use crate::error::{DbError, DbResult};
use gobus_core::{ActionKind, HttpMethod, QueuedAction};

/// Raw row as stored.
#[derive(Debug, sqlx::FromRow)]
struct QueuedActionRow {
    id: String,
    kind: String,
    endpoint: Option<String>,
    method: Option<String>,
    payload: Option<String>,
    enqueued_at: i64,
    retry_count: i64,
    max_retries: i64,
}

impl TryFrom<QueuedActionRow> for QueuedAction {
    type Error = DbError;

    fn try_from(row: QueuedActionRow) -> Result<Self, Self::Error> {
        Ok(QueuedAction {
            kind: row.kind.parse::<ActionKind>()?,
            method: row.method.as_deref().map(str::parse::<HttpMethod>).transpose()?,
            payload: row
                .payload
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?,
            enqueued_at: from_millis(row.enqueued_at)?,
            retry_count: to_u32("retry_count", row.retry_count)?,
            max_retries: to_u32("max_retries", row.max_retries)?,
            endpoint: row.endpoint,
            id: row.id,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, kind, endpoint, method, payload, enqueued_at, retry_count, max_retries
    FROM queued_actions
"#;

/// Repository for queued action persistence.
#[derive(Debug, Clone)]
pub struct ActionQueueRepository {
    pool: SqlitePool,
}

impl ActionQueueRepository {
    /// Creates a new ActionQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ActionQueueRepository { pool }
    }

    /// Appends an action to the durable queue.
    pub async fn insert(&self, action: &QueuedAction) -> DbResult<()> {
        debug!(id = %action.id, kind = %action.kind, "Persisting queued action");

        let payload = action
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO queued_actions (
                id, kind, endpoint, method, payload,
                enqueued_at, retry_count, max_retries
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&action.id)
        .bind(action.kind.as_str())
        .bind(action.endpoint.as_deref())
        .bind(action.method.map(|m| m.as_str()))
        .bind(payload)
        .bind(to_millis(action.enqueued_at))
        .bind(i64::from(action.retry_count))
        .bind(i64::from(action.max_retries))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrites the mutable fields of a stored action.
    ///
    /// `id`, `kind` and `enqueued_at` are fixed at enqueue time and are not
    /// rewritten. Fails with `NotFound` if the action is no longer stored.
    pub async fn update(&self, action: &QueuedAction) -> DbResult<()> {
        let payload = action
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE queued_actions SET
                endpoint = ?2,
                method = ?3,
                payload = ?4,
                retry_count = ?5,
                max_retries = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&action.id)
        .bind(action.endpoint.as_deref())
        .bind(action.method.map(|m| m.as_str()))
        .bind(payload)
        .bind(i64::from(action.retry_count))
        .bind(i64::from(action.max_retries))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("QueuedAction", &action.id));
        }

        debug!(
            id = %action.id,
            retry_count = action.retry_count,
            "Queued action updated"
        );
        Ok(())
    }

    /// Deletes an action. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM queued_actions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns every stored action in insertion order.
    pub async fn list_all(&self) -> DbResult<Vec<QueuedAction>> {
        let rows: Vec<QueuedActionRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY seq ASC"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(QueuedAction::try_from).collect()
    }

    /// Gets a single action by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<QueuedAction>> {
        let row: Option<QueuedActionRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(QueuedAction::try_from).transpose()
    }

    /// Counts stored actions.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queued_actions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

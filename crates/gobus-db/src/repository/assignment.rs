//! # Bus Assignment Repository
//!
//! Assigns drivers to buses with database-enforced exclusivity.
//!
//! ## Assign Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION                                    │
//! │                                                                         │
//! │  1. SELECT active assignment for bus_id     ── found? → conflict(bus)  │
//! │  2. SELECT active assignment for driver_id  ── found? → conflict(drv)  │
//! │  3. INSERT status = 'active'                                           │
//! │       │                                                                 │
//! │       └── UNIQUE violation (another writer won the race)               │
//! │              idx_bus_assignments_active_bus    → conflict(bus)         │
//! │              idx_bus_assignments_active_driver → conflict(driver)      │
//! │                                                                         │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use super::{from_millis, to_millis};
use crate::error::{DbError, DbResult};
use gobus_core::validation::validate_identifier;
use gobus_core::{AssignmentStatus, BusAssignment};

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: String,
    bus_id: String,
    driver_id: String,
    status: String,
    assigned_at: i64,
    ended_at: Option<i64>,
}

impl TryFrom<AssignmentRow> for BusAssignment {
    type Error = DbError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(BusAssignment {
            status: row.status.parse::<AssignmentStatus>()?,
            assigned_at: from_millis(row.assigned_at)?,
            ended_at: row.ended_at.map(from_millis).transpose()?,
            id: row.id,
            bus_id: row.bus_id,
            driver_id: row.driver_id,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, bus_id, driver_id, status, assigned_at, ended_at FROM bus_assignments";

#[derive(Debug, Clone)]
pub struct AssignmentRepository {
    pool: SqlitePool,
}

impl AssignmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AssignmentRepository { pool }
    }

    /// Creates an active assignment of `driver_id` to `bus_id`.
    ///
    /// Fails with `AssignmentConflict` if either side already holds an
    /// active assignment.
    pub async fn assign(
        &self,
        bus_id: &str,
        driver_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<BusAssignment> {
        validate_identifier("bus_id", bus_id)?;
        validate_identifier("driver_id", driver_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let bus_taken: Option<String> = sqlx::query_scalar(
            "SELECT id FROM bus_assignments WHERE bus_id = ?1 AND status = 'active'",
        )
        .bind(bus_id)
        .fetch_optional(&mut *tx)
        .await?;
        if bus_taken.is_some() {
            return Err(DbError::assignment_conflict("bus", bus_id));
        }

        let driver_taken: Option<String> = sqlx::query_scalar(
            "SELECT id FROM bus_assignments WHERE driver_id = ?1 AND status = 'active'",
        )
        .bind(driver_id)
        .fetch_optional(&mut *tx)
        .await?;
        if driver_taken.is_some() {
            return Err(DbError::assignment_conflict("driver", driver_id));
        }

        let assignment = BusAssignment {
            id: Uuid::new_v4().to_string(),
            bus_id: bus_id.to_string(),
            driver_id: driver_id.to_string(),
            status: AssignmentStatus::Active,
            assigned_at: now,
            ended_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO bus_assignments (id, bus_id, driver_id, status, assigned_at, ended_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL)
            "#,
        )
        .bind(&assignment.id)
        .bind(&assignment.bus_id)
        .bind(&assignment.driver_id)
        .bind(assignment.status.as_str())
        .bind(to_millis(assignment.assigned_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("driver_id") => {
                DbError::assignment_conflict("driver", driver_id)
            }
            DbError::UniqueViolation { .. } => DbError::assignment_conflict("bus", bus_id),
            other => other,
        })?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            id = %assignment.id,
            bus_id = %bus_id,
            driver_id = %driver_id,
            "Driver assigned to bus"
        );
        Ok(assignment)
    }

    /// Ends an active assignment. Missing or already ended is `NotFound`.
    pub async fn end(&self, id: &str, now: DateTime<Utc>) -> DbResult<BusAssignment> {
        let result = sqlx::query(
            r#"
            UPDATE bus_assignments SET status = 'ended', ended_at = ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("BusAssignment", id));
        }

        debug!(id = %id, "Assignment ended");

        let row: AssignmentRow = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        BusAssignment::try_from(row)
    }

    pub async fn active_for_bus(&self, bus_id: &str) -> DbResult<Option<BusAssignment>> {
        let row: Option<AssignmentRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE bus_id = ?1 AND status = 'active'"
        ))
        .bind(bus_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BusAssignment::try_from).transpose()
    }

    pub async fn active_for_driver(&self, driver_id: &str) -> DbResult<Option<BusAssignment>> {
        let row: Option<AssignmentRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE driver_id = ?1 AND status = 'active'"
        ))
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BusAssignment::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn repo() -> AssignmentRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().assignments()
    }

    #[tokio::test]
    async fn test_assign_and_lookup() {
        let repo = repo().await;
        let now = Utc::now();

        let a = repo.assign("RAB-101", "drv-1", now).await.unwrap();
        assert!(a.is_active());

        let by_bus = repo.active_for_bus("RAB-101").await.unwrap().unwrap();
        let by_driver = repo.active_for_driver("drv-1").await.unwrap().unwrap();
        assert_eq!(by_bus.id, a.id);
        assert_eq!(by_driver.id, a.id);
    }

    #[tokio::test]
    async fn test_bus_and_driver_are_exclusive() {
        let repo = repo().await;
        let now = Utc::now();
        repo.assign("RAB-101", "drv-1", now).await.unwrap();

        let err = repo.assign("RAB-101", "drv-2", now).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::AssignmentConflict { ref resource, .. } if resource == "bus"
        ));

        let err = repo.assign("RAB-202", "drv-1", now).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::AssignmentConflict { ref resource, .. } if resource == "driver"
        ));
    }

    #[tokio::test]
    async fn test_unique_index_backs_the_check() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        db.assignments().assign("RAB-101", "drv-1", now).await.unwrap();

        // Bypass the pre-check: the partial index must still refuse.
        let err = sqlx::query(
            "INSERT INTO bus_assignments (id, bus_id, driver_id, status, assigned_at) \
             VALUES ('x', 'RAB-101', 'drv-9', 'active', 0)",
        )
        .execute(db.pool())
        .await
        .map_err(DbError::from)
        .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_end_frees_both_sides() {
        let repo = repo().await;
        let now = Utc::now();
        let a = repo.assign("RAB-101", "drv-1", now).await.unwrap();

        let ended = repo.end(&a.id, now).await.unwrap();
        assert_eq!(ended.status, AssignmentStatus::Ended);
        assert!(ended.ended_at.is_some());
        assert!(repo.active_for_bus("RAB-101").await.unwrap().is_none());

        repo.assign("RAB-101", "drv-1", now).await.unwrap();

        let err = repo.end(&a.id, now).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_assign_rejects_blank_ids() {
        let repo = repo().await;
        let err = repo.assign("", "drv-1", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }
}

//! # Cache Repository
//!
//! Stores previously fetched server responses for offline reads.
//!
//! Expiry rule: an entry is stale when `now > expires_at`. A stale entry is
//! purged by the read that finds it, inside the same transaction, so a
//! concurrent `put` of a fresh value is never deleted by mistake.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::{from_millis, to_millis};
use crate::error::{DbError, DbResult};
use gobus_core::CacheEntry;

#[derive(Debug, sqlx::FromRow)]
struct CacheEntryRow {
    key: String,
    value: String,
    stored_at: i64,
    expires_at: i64,
}

impl TryFrom<CacheEntryRow> for CacheEntry {
    type Error = DbError;

    fn try_from(row: CacheEntryRow) -> Result<Self, Self::Error> {
        Ok(CacheEntry {
            value: serde_json::from_str(&row.value)?,
            stored_at: from_millis(row.stored_at)?,
            expires_at: from_millis(row.expires_at)?,
            key: row.key,
        })
    }
}

/// Repository for cached responses.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CacheRepository { pool }
    }

    /// Inserts or replaces the entry for `entry.key`.
    pub async fn put(&self, entry: &CacheEntry) -> DbResult<()> {
        let value = serde_json::to_string(&entry.value)?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, stored_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                stored_at = excluded.stored_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&entry.key)
        .bind(value)
        .bind(to_millis(entry.stored_at))
        .bind(to_millis(entry.expires_at))
        .execute(&self.pool)
        .await?;

        debug!(key = %entry.key, expires_at = %entry.expires_at, "Cache entry stored");
        Ok(())
    }

    /// Returns the entry for `key` if it is still fresh at `now`.
    ///
    /// ## Flow (single transaction)
    /// ```text
    /// BEGIN
    ///   DELETE ... WHERE key = ? AND expires_at < now   (purge if stale)
    ///   SELECT ... WHERE key = ?                        (whatever is left)
    /// COMMIT
    /// ```
    /// Deleting first takes the write lock up front, so the read-and-purge
    /// never has to upgrade a read lock.
    pub async fn get_fresh(&self, key: &str, now: DateTime<Utc>) -> DbResult<Option<CacheEntry>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let purged = sqlx::query("DELETE FROM cache_entries WHERE key = ?1 AND expires_at < ?2")
            .bind(key)
            .bind(to_millis(now))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let row: Option<CacheEntryRow> = sqlx::query_as(
            "SELECT key, value, stored_at, expires_at FROM cache_entries WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        if purged > 0 {
            debug!(key = %key, "Expired cache entry purged on read");
        }

        row.map(CacheEntry::try_from).transpose()
    }

    /// Deletes the entry for `key`. Returns whether a row was removed.
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every entry that expired before `now`. Returns the count.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at < ?1")
            .bind(to_millis(now))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts stored entries, stale ones included.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use serde_json::json;

    fn entry(key: &str, stored_at: DateTime<Utc>, ttl_ms: i64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            value: json!({"trips": [{"id": 1, "from": "Kigali", "to": "Huye"}]}),
            stored_at,
            expires_at: stored_at + Duration::milliseconds(ttl_ms),
        }
    }

    async fn repo() -> CacheRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().cache()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_760_000_000_000).unwrap()
    }

    #[tokio::test]
    async fn test_get_fresh_then_stale() {
        let repo = repo().await;
        let e = entry("trips", t0(), 100);
        repo.put(&e).await.unwrap();

        let hit = repo
            .get_fresh("trips", t0() + Duration::milliseconds(50))
            .await
            .unwrap();
        assert_eq!(hit, Some(e.clone()));

        // Exactly at expires_at is still fresh.
        assert!(repo.get_fresh("trips", e.expires_at).await.unwrap().is_some());

        let miss = repo
            .get_fresh("trips", t0() + Duration::milliseconds(150))
            .await
            .unwrap();
        assert_eq!(miss, None);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let repo = repo().await;
        repo.put(&entry("trips", t0(), 100)).await.unwrap();

        let mut newer = entry("trips", t0() + Duration::seconds(1), 60_000);
        newer.value = json!("replaced");
        repo.put(&newer).await.unwrap();

        let hit = repo.get_fresh("trips", newer.stored_at).await.unwrap().unwrap();
        assert_eq!(hit.value, json!("replaced"));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_expired_counts_rows() {
        let repo = repo().await;
        repo.put(&entry("a", t0(), 100)).await.unwrap();
        repo.put(&entry("b", t0(), 100)).await.unwrap();
        repo.put(&entry("c", t0(), 10_000)).await.unwrap();

        let removed = repo
            .delete_expired(t0() + Duration::milliseconds(150))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let repo = repo().await;
        repo.put(&entry("a", t0(), 100)).await.unwrap();
        assert!(repo.delete("a").await.unwrap());
        assert!(!repo.delete("a").await.unwrap());
    }
}

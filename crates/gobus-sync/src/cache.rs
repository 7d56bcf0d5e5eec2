//! # Response Cache
//!
//! TTL cache of server responses for offline browsing. Time comes from the
//! injected [`Clock`]; expiry is checked against it on every read.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use gobus_core::validation::{validate_cache_key, validate_ttl};
use gobus_core::{CacheEntry, Clock, ValidationError};
use gobus_db::CacheRepository;

use crate::error::SyncResult;

pub struct CacheStore {
    repo: CacheRepository,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(repo: CacheRepository, clock: Arc<dyn Clock>) -> Self {
        CacheStore { repo, clock }
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    pub async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> SyncResult<CacheEntry> {
        validate_cache_key(key)?;
        validate_ttl(ttl)?;

        let ttl_too_large = || ValidationError::OutOfRange {
            field: "ttl".to_string(),
            min: 1,
            max: i64::MAX,
        };

        let stored_at = self.clock.now_millis();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| stored_at.checked_add_signed(ttl))
            .ok_or_else(ttl_too_large)?;

        let entry = CacheEntry {
            key: key.to_string(),
            value,
            stored_at,
            expires_at,
        };
        self.repo.put(&entry).await?;

        Ok(entry)
    }

    /// Returns the cached value, or `None` if absent or expired.
    pub async fn get(&self, key: &str) -> SyncResult<Option<serde_json::Value>> {
        let entry = self.repo.get_fresh(key, self.clock.now()).await?;

        if entry.is_none() {
            debug!(key = %key, "Cache miss");
        }
        Ok(entry.map(|e| e.value))
    }

    /// Deletes every expired entry. Returns how many were removed.
    pub async fn clear_expired(&self) -> SyncResult<u64> {
        let removed = self.repo.delete_expired(self.clock.now()).await?;

        if removed > 0 {
            info!(count = removed, "Expired cache entries cleared");
        }
        Ok(removed)
    }

    /// Removes one entry. Missing keys are a no-op.
    pub async fn remove(&self, key: &str) -> SyncResult<bool> {
        Ok(self.repo.delete(key).await?)
    }

    /// Stored entries, including ones not yet swept.
    pub async fn len(&self) -> SyncResult<u64> {
        Ok(self.repo.count().await?.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use gobus_core::ManualClock;
    use gobus_db::{Database, DbConfig};
    use serde_json::json;

    async fn store() -> (CacheStore, Arc<ManualClock>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(ManualClock::default());
        (CacheStore::new(db.cache(), clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_expiry_follows_the_clock() {
        let (cache, clock) = store().await;
        let routes = json!([{"from": "Kigali", "to": "Huye"}]);

        cache
            .put("routes:kigali", routes.clone(), Duration::from_millis(100))
            .await
            .unwrap();

        clock.advance(chrono::Duration::milliseconds(50));
        assert_eq!(cache.get("routes:kigali").await.unwrap(), Some(routes));

        clock.advance(chrono::Duration::milliseconds(100));
        assert_eq!(cache.get("routes:kigali").await.unwrap(), None);

        assert_eq!(cache.clear_expired().await.unwrap(), 0);
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_expired_sweeps_unread_entries() {
        let (cache, clock) = store().await;
        cache.put("a", json!(1), Duration::from_millis(100)).await.unwrap();
        cache.put("b", json!(2), Duration::from_secs(60)).await.unwrap();

        clock.advance(chrono::Duration::milliseconds(150));
        assert_eq!(cache.clear_expired().await.unwrap(), 1);
        assert_eq!(cache.len().await.unwrap(), 1);
        assert_eq!(cache.get("b").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (cache, _clock) = store().await;
        cache.put("wallet", json!({"balance": 100}), Duration::from_secs(60)).await.unwrap();
        let entry = cache
            .put("wallet", json!({"balance": 250}), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(entry.expires_at - entry.stored_at, chrono::Duration::seconds(60));
        assert_eq!(cache.get("wallet").await.unwrap(), Some(json!({"balance": 250})));
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_validates_key_and_ttl() {
        let (cache, _clock) = store().await;

        let err = cache.put("", json!(1), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let err = cache.put("k", json!(1), Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let err = cache.put("k", json!(1), Duration::MAX).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (cache, _clock) = store().await;
        cache.put("k", json!(1), Duration::from_secs(1)).await.unwrap();

        assert!(cache.remove("k").await.unwrap());
        assert!(!cache.remove("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stored_at_is_millisecond_aligned() {
        let (cache, clock) = store().await;
        clock.advance(chrono::Duration::nanoseconds(1_500_999));

        let entry = cache.put("fares", json!([1200]), Duration::from_secs(5)).await.unwrap();
        assert_eq!(entry.stored_at.timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(entry.expires_at - entry.stored_at, chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_storage_failure_reaches_caller() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cache = CacheStore::new(db.cache(), Arc::new(ManualClock::default()));
        db.close().await;

        let err = cache.put("k", json!(1), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::Database(_)));
        let err = cache.get("k").await.unwrap_err();
        assert!(matches!(err, SyncError::Database(_)));
    }
}

//! # Session Repository
//!
//! Small key/value table for session state, chiefly the bearer token that
//! replayed calls carry in `Authorization`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Key under which the bearer credential is stored.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM session WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Upserts `key`. `updated_at` is milliseconds since the epoch.
    pub async fn set(&self, key: &str, value: &str, updated_at: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO session (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM session WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Current bearer token, if one is stored.
    pub async fn auth_token(&self) -> DbResult<Option<String>> {
        self.get(AUTH_TOKEN_KEY).await
    }

    /// Stores the bearer token, or clears it with `None`.
    pub async fn set_auth_token(&self, token: Option<&str>) -> DbResult<()> {
        match token {
            Some(token) => {
                self.set(AUTH_TOKEN_KEY, token, Utc::now().timestamp_millis())
                    .await?;
                debug!("Auth token stored");
            }
            None => {
                self.delete(AUTH_TOKEN_KEY).await?;
                debug!("Auth token cleared");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_auth_token_set_replace_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let session = db.session();

        assert_eq!(session.auth_token().await.unwrap(), None);

        session.set_auth_token(Some("tok-1")).await.unwrap();
        session.set_auth_token(Some("tok-2")).await.unwrap();
        assert_eq!(session.auth_token().await.unwrap().as_deref(), Some("tok-2"));

        session.set_auth_token(None).await.unwrap();
        assert_eq!(session.auth_token().await.unwrap(), None);
    }
}

//! # Action Replay
//!
//! Turns a queued action back into the side effect it stands for.
//!
//! ## Remote Call Replay
//! ```text
//! QueuedAction { method: POST, endpoint: "/bookings", payload }
//!        │
//!        ▼
//! base_url "https://api.gobus.rw/api/" + "bookings"
//!        │
//!        ▼
//! POST https://api.gobus.rw/api/bookings
//!   Authorization: Bearer <token read from the session table now>
//!   Content-Type: application/json
//!        │
//!        ├── 2xx       → Ok(())
//!        ├── non-2xx   → Err(HttpStatus)
//!        └── transport → Err(RequestFailed)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;
use url::Url;

use gobus_core::{HttpMethod, QueuedAction};
use gobus_db::SessionRepository;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Credentials
// =============================================================================

/// Supplies the bearer token attached to replayed calls.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn bearer_token(&self) -> SyncResult<Option<String>>;
}

/// Reads the token from the session table on every call.
pub struct SessionCredentials {
    repo: SessionRepository,
}

impl SessionCredentials {
    pub fn new(repo: SessionRepository) -> Self {
        SessionCredentials { repo }
    }
}

#[async_trait]
impl CredentialSource for SessionCredentials {
    async fn bearer_token(&self) -> SyncResult<Option<String>> {
        Ok(self.repo.auth_token().await?)
    }
}

// =============================================================================
// Replayers
// =============================================================================

/// Replays a remote-call action.
#[async_trait]
pub trait ActionReplayer: Send + Sync {
    async fn replay(&self, action: &QueuedAction) -> SyncResult<()>;
}

/// Handles local-only actions. Without one, local-only actions stay queued.
#[async_trait]
pub trait LocalActionHandler: Send + Sync {
    async fn handle(&self, action: &QueuedAction) -> SyncResult<()>;
}

/// Replays actions as HTTP requests against the GoBus API.
pub struct HttpReplayer {
    client: reqwest::Client,
    base_url: Url,
    credentials: std::sync::Arc<dyn CredentialSource>,
}

impl HttpReplayer {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: std::sync::Arc<dyn CredentialSource>,
    ) -> SyncResult<Self> {
        // A trailing slash makes Url::join append instead of replacing the last segment.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(HttpReplayer {
            client,
            base_url,
            credentials,
        })
    }

    /// Resolves an endpoint against the base URL.
    pub fn resolve(&self, endpoint: &str) -> SyncResult<Url> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(Url::parse(endpoint)?);
        }
        Ok(self.base_url.join(endpoint.trim_start_matches('/'))?)
    }
}

fn to_reqwest(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl ActionReplayer for HttpReplayer {
    async fn replay(&self, action: &QueuedAction) -> SyncResult<()> {
        let (Some(endpoint), Some(method)) = (action.endpoint.as_deref(), action.method) else {
            return Err(SyncError::MissingEndpoint {
                id: action.id.clone(),
            });
        };

        let url = self.resolve(endpoint)?;
        let mut request = self.client.request(to_reqwest(method), url.clone());

        if let Some(token) = self.credentials.bearer_token().await? {
            request = request.bearer_auth(token);
        }
        if let Some(ref payload) = action.payload {
            request = request.json(payload);
        }

        debug!(id = %action.id, method = %method, url = %url, "Replaying action");

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{post, put};
    use axum::{Json, Router};
    use gobus_core::NewAction;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    struct StaticToken(Mutex<Option<String>>);

    #[async_trait]
    impl CredentialSource for StaticToken {
        async fn bearer_token(&self) -> SyncResult<Option<String>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    /// Serves `/api/bookings` (checks auth and echoes) and `/api/fail` (500).
    async fn spawn_api() -> String {
        async fn bookings(headers: HeaderMap, Json(body): Json<Value>) -> StatusCode {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if auth == "Bearer tok-2" && body["tripId"] == 7 {
                StatusCode::CREATED
            } else {
                StatusCode::UNAUTHORIZED
            }
        }

        let app = Router::new()
            .route("/api/bookings", post(bookings))
            .route("/api/fail", put(|| async { StatusCode::INTERNAL_SERVER_ERROR }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn action(method: HttpMethod, endpoint: &str) -> QueuedAction {
        NewAction::remote_call(method, endpoint, json!({"tripId": 7}))
            .into_queued("1-abc".into(), chrono::Utc::now(), 3)
    }

    #[test]
    fn test_resolve_joins_relative_endpoints() {
        let creds = Arc::new(StaticToken(Mutex::new(None)));
        let replayer =
            HttpReplayer::new("https://api.gobus.rw/api", Duration::from_secs(1), creds).unwrap();

        assert_eq!(
            replayer.resolve("/bookings/12").unwrap().as_str(),
            "https://api.gobus.rw/api/bookings/12"
        );
        assert_eq!(
            replayer.resolve("https://pay.gobus.rw/momo").unwrap().as_str(),
            "https://pay.gobus.rw/momo"
        );
    }

    #[tokio::test]
    async fn test_token_is_read_at_call_time() {
        let base = spawn_api().await;
        let creds = Arc::new(StaticToken(Mutex::new(Some("tok-1".into()))));
        let replayer = HttpReplayer::new(&base, Duration::from_secs(5), creds.clone()).unwrap();

        let err = replayer
            .replay(&action(HttpMethod::Post, "/bookings"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::HttpStatus { status: 401, .. }));

        *creds.0.lock().unwrap() = Some("tok-2".into());
        replayer
            .replay(&action(HttpMethod::Post, "/bookings"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_failure() {
        let base = spawn_api().await;
        let creds = Arc::new(StaticToken(Mutex::new(None)));
        let replayer = HttpReplayer::new(&base, Duration::from_secs(5), creds).unwrap();

        let err = replayer.replay(&action(HttpMethod::Put, "/fail")).await.unwrap_err();
        assert!(matches!(err, SyncError::HttpStatus { status: 500, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let creds = Arc::new(StaticToken(Mutex::new(None)));
        let replayer =
            HttpReplayer::new("http://127.0.0.1:9/api", Duration::from_secs(1), creds).unwrap();

        let mut action = action(HttpMethod::Post, "/bookings");
        action.endpoint = None;
        let err = replayer.replay(&action).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingEndpoint { .. }));
    }

    #[tokio::test]
    async fn test_session_credentials_follow_the_table() {
        let db = gobus_db::Database::new(gobus_db::DbConfig::in_memory()).await.unwrap();
        let creds = SessionCredentials::new(db.session());
        assert_eq!(creds.bearer_token().await.unwrap(), None);

        db.session().set_auth_token(Some("tok-9")).await.unwrap();
        assert_eq!(creds.bearer_token().await.unwrap(), Some("tok-9".into()));
    }
}

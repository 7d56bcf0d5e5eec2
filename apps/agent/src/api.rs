//! # Agent HTTP API
//!
//! Loopback routes through which the front end reaches the offline service.
//!
//! ## Routes
//! ```text
//! POST /queue                    NewAction        → 201 { id }
//! GET  /status                                    → { online, queue, droppedTotal }
//! PUT  /cache/{key}              { value, ttlSecs? } → 204
//! GET  /cache/{key}                               → value | 404
//! POST /sync                                      → SweepOutcome
//! PUT  /connectivity             { online }       → { online, changed }
//! PUT  /session                  { token | null } → 204
//! POST /assignments              { busId, driverId } → 201 BusAssignment
//! POST /assignments/{id}/end                      → BusAssignment
//! GET  /health                                    → { status, database }
//! ```

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use gobus_core::{BusAssignment, NewAction, QueueStatus};
use gobus_sync::{SweepOutcome, Transition};

use crate::error::ApiError;
use crate::state::AppState;

pub type ApiResult<T> = Result<T, ApiError>;

/// JSON request body whose rejection is reported as an [`ApiError`].
type Body<T> = Result<Json<T>, JsonRejection>;

/// Builds the agent router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/queue", post(queue_action))
        .route("/status", get(status))
        .route("/cache/{key}", put(put_cache).get(get_cache))
        .route("/sync", post(sync_now))
        .route("/connectivity", put(set_connectivity))
        .route("/session", put(set_session))
        .route("/assignments", post(assign_bus))
        .route("/assignments/{id}/end", post(end_assignment))
        .route("/health", get(health))
        .with_state(state)
}

// =============================================================================
// DTOs
// =============================================================================

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub online: bool,
    pub queue: QueueStatus,
    pub dropped_total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePutRequest {
    pub value: serde_json::Value,
    /// Falls back to `cache.default_ttl_secs`.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectivityResponse {
    pub online: bool,
    pub changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub bus_id: String,
    pub driver_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
}

// =============================================================================
// Handlers
// =============================================================================

async fn queue_action(
    State(state): State<AppState>,
    body: Body<NewAction>,
) -> ApiResult<(StatusCode, Json<QueuedResponse>)> {
    let Json(action) = body?;
    let id = state.service.queue_action(action).await?;
    Ok((StatusCode::CREATED, Json(QueuedResponse { id })))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        online: state.service.is_online_status(),
        queue: state.service.get_queue_status().await,
        dropped_total: state.events.dropped_total(),
    })
}

async fn put_cache(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Body<CachePutRequest>,
) -> ApiResult<StatusCode> {
    let Json(body) = body?;
    let ttl = body.ttl_secs.map(Duration::from_secs);
    state.service.cache_data(&key, body.value, ttl).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_cache(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .service
        .get_cached_data(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Cache entry", &key))
}

async fn sync_now(State(state): State<AppState>) -> Json<SweepOutcome> {
    Json(state.service.sync_queue().await)
}

async fn set_connectivity(
    State(state): State<AppState>,
    body: Body<ConnectivityRequest>,
) -> ApiResult<Json<ConnectivityResponse>> {
    let Json(body) = body?;
    let transition = state.service.set_online(body.online);
    debug!(online = body.online, ?transition, "Connectivity reported");

    Ok(Json(ConnectivityResponse {
        online: state.service.is_online_status(),
        changed: transition != Transition::Unchanged,
    }))
}

async fn set_session(
    State(state): State<AppState>,
    body: Body<SessionRequest>,
) -> ApiResult<StatusCode> {
    let Json(body) = body?;
    state.service.set_auth_token(body.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_bus(
    State(state): State<AppState>,
    body: Body<AssignRequest>,
) -> ApiResult<(StatusCode, Json<BusAssignment>)> {
    let Json(body) = body?;
    let assignment = state
        .service
        .database()
        .assignments()
        .assign(&body.bus_id, &body.driver_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn end_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BusAssignment>> {
    let assignment = state
        .service
        .database()
        .assignments()
        .end(&id, Utc::now())
        .await?;
    Ok(Json(assignment))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = state.service.database().health_check().await;
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentEventEmitter;
    use gobus_db::{Database, DbConfig};
    use gobus_sync::{OfflineConfig, OfflineService};
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// Serves the router on a loopback port with the service offline.
    async fn spawn_agent() -> (String, reqwest::Client) {
        let mut config = OfflineConfig::default();
        config.connectivity.assume_online = false;

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let events = Arc::new(AgentEventEmitter::new());
        let service = OfflineService::builder(config)
            .with_database(db)
            .with_emitter(events.clone())
            .build()
            .unwrap();
        let app = router(AppState::new(Arc::new(service), events));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_queue_and_status() {
        let (base, client) = spawn_agent().await;

        let resp = client
            .post(format!("{base}/queue"))
            .json(&json!({
                "kind": "remote_call",
                "method": "POST",
                "endpoint": "/bookings",
                "payload": {"tripId": 7, "seat": "3A"}
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        assert!(body["id"].as_str().unwrap().contains('-'));

        let status: Value = client
            .get(format!("{base}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["online"], false);
        assert_eq!(status["queue"]["total"], 1);
        assert_eq!(status["queue"]["pending"], 1);
        assert_eq!(status["droppedTotal"], 0);
    }

    #[tokio::test]
    async fn test_invalid_action_is_400() {
        let (base, client) = spawn_agent().await;

        let resp = client
            .post(format!("{base}/queue"))
            .json(&json!({"kind": "remote_call", "method": "POST"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_400() {
        let (base, client) = spawn_agent().await;

        let resp = client
            .post(format!("{base}/queue"))
            .json(&json!({"kind": "sync_later"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["message"].as_str().unwrap().contains("kind"));

        let resp = client
            .put(format!("{base}/connectivity"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_cache_round_trip() {
        let (base, client) = spawn_agent().await;

        let resp = client
            .put(format!("{base}/cache/routes"))
            .json(&json!({"value": [{"from": "Kigali", "to": "Musanze"}], "ttlSecs": 60}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

        let value: Value = client
            .get(format!("{base}/cache/routes"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(value[0]["to"], "Musanze");

        let resp = client.get(format!("{base}/cache/missing")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sync_and_connectivity() {
        let (base, client) = spawn_agent().await;

        let outcome: Value = client
            .post(format!("{base}/sync"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(outcome, json!({"status": "skipped", "reason": "offline"}));

        let resp: Value = client
            .put(format!("{base}/connectivity"))
            .json(&json!({"online": true}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp, json!({"online": true, "changed": true}));

        let outcome: Value = client
            .post(format!("{base}/sync"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(outcome["reason"], "empty");
    }

    #[tokio::test]
    async fn test_assignment_conflict_is_409() {
        let (base, client) = spawn_agent().await;
        let assign = |bus: &str, driver: &str| {
            client
                .post(format!("{base}/assignments"))
                .json(&json!({"busId": bus, "driverId": driver}))
                .send()
        };

        let resp = assign("RAB-101", "drv-1").await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let created: Value = resp.json().await.unwrap();

        let resp = assign("RAB-101", "drv-2").await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);

        let id = created["id"].as_str().unwrap();
        let resp = client
            .post(format!("{base}/assignments/{id}/end"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let resp = assign("RAB-101", "drv-2").await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_session_and_health() {
        let (base, client) = spawn_agent().await;

        let resp = client
            .put(format!("{base}/session"))
            .json(&json!({"token": "tok-1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

        let health: Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health, json!({"status": "ok", "database": true}));
    }
}

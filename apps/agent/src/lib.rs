//! # gobus-agent
//!
//! Local agent that owns the offline service and exposes it to the front end.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Agent Startup                                   │
//! │                                                                         │
//! │  1. Initialize Logging ───────────────────────────────────────────────► │
//! │     • tracing-subscriber with env filter                                │
//! │     • Default: info,gobus=debug, can be overridden with RUST_LOG        │
//! │                                                                         │
//! │  2. Load OfflineConfig ───────────────────────────────────────────────► │
//! │     • CLI path, $GOBUS_CONFIG, or platform config dir                   │
//! │                                                                         │
//! │  3. Connect to Database ──────────────────────────────────────────────► │
//! │     • SQLite with WAL mode, pending migrations applied                  │
//! │                                                                         │
//! │  4. Build & Start OfflineService ─────────────────────────────────────► │
//! │                                                                         │
//! │  5. Serve the API until Ctrl-C / SIGTERM, then stop the service         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod error;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gobus_db::{Database, DbConfig};
use gobus_sync::{OfflineConfig, OfflineService};

use crate::state::{AgentEventEmitter, AppState};

/// Runs the agent until a shutdown signal arrives.
pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    init_tracing();

    let config = OfflineConfig::load(config_path).context("loading offline config")?;
    let addr = config.agent_addr()?;

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    info!(?db_path, "Database path determined");

    let db = Database::new(DbConfig::new(db_path))
        .await
        .context("opening offline database")?;

    let events = Arc::new(AgentEventEmitter::new());
    let service = Arc::new(
        OfflineService::builder(config)
            .with_database(db.clone())
            .with_emitter(events.clone())
            .build()?,
    );
    service.start().await?;

    let app = api::router(AppState::new(service.clone(), events));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "Agent API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.stop().await?;
    db.close().await;

    info!("Agent stopped");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=gobus_sync=trace` - Trace the sync engine only
/// - Default: `info,gobus=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gobus=debug,sqlx=warn"));

    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

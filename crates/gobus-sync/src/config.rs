//! # Offline Configuration
//!
//! Configuration management for the offline queue and sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     GOBUS_API_URL=https://api.gobus.rw/api                             │
//! │     GOBUS_SYNC_INTERVAL_SECS=30                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     $GOBUS_CONFIG, or                                                  │
//! │     ~/.config/gobus/offline.toml (Linux)                               │
//! │     ~/Library/Application Support/rw.gobus.gobus/offline.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # offline.toml
//! [api]
//! base_url = "https://api.gobus.rw/api"
//! request_timeout_ms = 5000
//!
//! [queue]
//! default_max_retries = 3
//! sync_interval_secs = 30
//!
//! [cache]
//! default_ttl_secs = 300
//! sweep_interval_secs = 600
//!
//! [connectivity]
//! assume_online = true
//! probe_url = "https://api.gobus.rw/api/health"
//!
//! [storage]
//! database_path = "/var/lib/gobus/offline.db"
//!
//! [agent]
//! bind_addr = "127.0.0.1:7878"
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use gobus_core::validation::validate_max_retries;
use gobus_core::{DEFAULT_MAX_RETRIES, MAX_RETRIES_LIMIT};

use crate::error::{SyncError, SyncResult};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "GOBUS_CONFIG";

/// Upper bound for timer periods and backoff ceilings (one week).
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for request and probe timeouts (five minutes).
pub const MAX_TIMEOUT_MS: u64 = 5 * 60 * 1_000;

/// Upper bound for the default cache TTL (one year).
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

// =============================================================================
// API Settings
// =============================================================================

/// Where queued remote calls are replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL that relative endpoints are joined to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for a single replayed request (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout() -> u64 {
    5_000
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Retry ceiling for actions enqueued without one.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Period of the background sync timer while online (seconds).
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_sync_interval() -> u64 {
    30
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            default_max_retries: default_max_retries(),
            sync_interval_secs: default_sync_interval(),
        }
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL applied when a cache request carries none (seconds).
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// Period of the expired-entry sweep (seconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    600
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            default_ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

// =============================================================================
// Connectivity Settings
// =============================================================================

/// How online/offline status is determined.
///
/// ## Probe Schedule
/// ```text
/// online  ──► probe every probe_interval_secs
/// offline ──► re-probe after 1s, 2s, 4s ... capped at max_backoff_secs
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    /// Initial status when no probe is configured.
    #[serde(default = "default_true")]
    pub assume_online: bool,

    /// URL polled to detect reachability. No polling when absent.
    #[serde(default)]
    pub probe_url: Option<String>,

    /// Poll period while online (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Timeout for a single probe request (milliseconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// First re-probe delay while offline (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Longest re-probe delay while offline (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_probe_interval() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    3_000
}

fn default_initial_backoff() -> u64 {
    1_000
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        ConnectivitySettings {
            assume_online: true,
            probe_url: None,
            probe_interval_secs: default_probe_interval(),
            probe_timeout_ms: default_probe_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Storage & Agent Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to `offline.db` in the platform data dir.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Address the local agent API listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings {
            bind_addr: default_bind_addr(),
        }
    }
}

// =============================================================================
// Main Offline Configuration
// =============================================================================

/// Complete offline subsystem configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfflineConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub connectivity: ConnectivitySettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub agent: AgentSettings,
}

impl OfflineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, `$GOBUS_CONFIG`, or the platform default)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading offline config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Offline config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let base = Url::parse(&self.api.base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "API base URL must be http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if let Some(ref probe) = self.connectivity.probe_url {
            let probe = Url::parse(probe)?;
            if !matches!(probe.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "Probe URL must be http:// or https://, got: {}",
                    probe
                )));
            }
        }

        validate_max_retries(self.queue.default_max_retries).map_err(|_| {
            SyncError::InvalidConfig(format!(
                "default_max_retries must be between 1 and {}",
                MAX_RETRIES_LIMIT
            ))
        })?;

        let bounded = [
            ("api.request_timeout_ms", self.api.request_timeout_ms, MAX_TIMEOUT_MS),
            ("queue.sync_interval_secs", self.queue.sync_interval_secs, MAX_INTERVAL_SECS),
            ("cache.default_ttl_secs", self.cache.default_ttl_secs, MAX_CACHE_TTL_SECS),
            ("cache.sweep_interval_secs", self.cache.sweep_interval_secs, MAX_INTERVAL_SECS),
            (
                "connectivity.probe_interval_secs",
                self.connectivity.probe_interval_secs,
                MAX_INTERVAL_SECS,
            ),
            ("connectivity.probe_timeout_ms", self.connectivity.probe_timeout_ms, MAX_TIMEOUT_MS),
            (
                "connectivity.initial_backoff_ms",
                self.connectivity.initial_backoff_ms,
                MAX_TIMEOUT_MS,
            ),
            (
                "connectivity.max_backoff_secs",
                self.connectivity.max_backoff_secs,
                MAX_INTERVAL_SECS,
            ),
        ];
        for (name, value, max) in bounded {
            if value == 0 || value > max {
                return Err(SyncError::InvalidConfig(format!(
                    "{name} must be between 1 and {max}, got {value}"
                )));
            }
        }

        self.agent_addr()?;

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable numbers are logged
    /// and ignored.
    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("GOBUS_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Some(path) = lookup("GOBUS_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(secs) = lookup("GOBUS_SYNC_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.queue.sync_interval_secs = s,
                Err(_) => warn!(value = %secs, "Invalid GOBUS_SYNC_INTERVAL_SECS"),
            }
        }

        if let Some(ms) = lookup("GOBUS_REQUEST_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(v) => self.api.request_timeout_ms = v,
                Err(_) => warn!(value = %ms, "Invalid GOBUS_REQUEST_TIMEOUT_MS"),
            }
        }

        if let Some(retries) = lookup("GOBUS_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(v) => self.queue.default_max_retries = v,
                Err(_) => warn!(value = %retries, "Invalid GOBUS_MAX_RETRIES"),
            }
        }

        if let Some(url) = lookup("GOBUS_PROBE_URL") {
            debug!(url = %url, "Overriding probe URL from environment");
            self.connectivity.probe_url = if url.is_empty() { None } else { Some(url) };
        }

        if let Some(addr) = lookup("GOBUS_AGENT_ADDR") {
            self.agent.bind_addr = addr;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("rw", "gobus", "gobus")
            .map(|dirs| dirs.config_dir().join("offline.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the database path, falling back to the platform data dir.
    pub fn database_path(&self) -> PathBuf {
        self.storage.database_path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("rw", "gobus", "gobus")
                .map(|dirs| dirs.data_dir().join("offline.db"))
                .unwrap_or_else(|| PathBuf::from("offline.db"))
        })
    }

    pub fn agent_addr(&self) -> SyncResult<SocketAddr> {
        self.agent.bind_addr.parse().map_err(|_| {
            SyncError::InvalidConfig(format!(
                "agent.bind_addr is not a socket address: {}",
                self.agent.bind_addr
            ))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.request_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.queue.sync_interval_secs)
    }

    pub fn default_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }
}

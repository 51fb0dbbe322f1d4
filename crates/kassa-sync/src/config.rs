//! # Sync Configuration
//!
//! Deployment configuration for the sync layer. Runtime state such as the
//! current mode lives in [`crate::settings`], not here.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KASSA_SERVER_ADDRESS=http://192.168.1.50:3001                      │
//! │     KASSA_RECONNECT_BUDGET=5                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/kassa-pos/sync.toml (Linux)                              │
//! │     ~/Library/Application Support/com.kassa.pos/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! name = "Register 1"
//! role = "client"          # server | client
//!
//! [server]
//! address = "http://192.168.1.50:3001"
//! port = 3001
//!
//! [sync]
//! probe_timeout_ms = 3000
//! reconnect_budget = 5
//! cache_ttl_secs = 30
//! promote_interval_ms = 15000  # 0 disables background promotion
//!
//! [paths]
//! data_dir = "/var/lib/kassa"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use kassa_core::{validation, ServerRole, DEFAULT_SERVER_PORT};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4), generated if absent.
    #[serde(default = "generate_device_id")]
    pub id: String,

    /// Human-readable name (e.g., "Register 1").
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Initial role, used until the settings file records one.
    #[serde(default)]
    pub role: ServerRole,
}

fn generate_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "POS Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: generate_device_id(),
            name: default_device_name(),
            role: ServerRole::default(),
        }
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// Where and how to reach the shared store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Initial base address, used until the settings file records one.
    #[serde(default)]
    pub address: Option<String>,

    /// Port the shared store listens on. Used for the server-role default.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Fixed prefix of every REST path.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Health probe path, under the prefix.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Realtime channel path (not prefixed).
    #[serde(default = "default_realtime_path")]
    pub realtime_path: String,
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}
fn default_api_prefix() -> String {
    "/api".to_string()
}
fn default_health_path() -> String {
    "/health".to_string()
}
fn default_realtime_path() -> String {
    "/ws".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            address: None,
            port: default_port(),
            api_prefix: default_api_prefix(),
            health_path: default_health_path(),
            realtime_path: default_realtime_path(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Timeouts, budgets and cache behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Health probe bound used by `is_reachable` (milliseconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Shorter probe run before opening the realtime channel (milliseconds).
    #[serde(default = "default_connect_probe_timeout")]
    pub connect_probe_timeout_ms: u64,

    /// Bound on every non-probe HTTP request (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Consecutive connection errors before the subscriber gives up.
    #[serde(default = "default_reconnect_budget")]
    pub reconnect_budget: u32,

    /// Initial reconnect backoff (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum reconnect backoff (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Read cache time-to-live (seconds).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Probe once at startup and promote to network mode if reachable.
    #[serde(default = "default_true")]
    pub autostart: bool,

    /// Period of the background check that promotes a demoted terminal
    /// back to network mode (milliseconds, 0 disables).
    #[serde(default = "default_promote_interval")]
    pub promote_interval_ms: u64,

    /// A realtime session must stay up this long before it counts as a
    /// successful connect for the reconnect budget (milliseconds).
    #[serde(default = "default_stable_connection")]
    pub stable_connection_ms: u64,
}

fn default_probe_timeout() -> u64 {
    3000
}
fn default_connect_probe_timeout() -> u64 {
    2000
}
fn default_request_timeout() -> u64 {
    10_000
}
fn default_reconnect_budget() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    10_000
}
fn default_cache_ttl() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_promote_interval() -> u64 {
    15_000
}
fn default_stable_connection() -> u64 {
    5_000
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            probe_timeout_ms: default_probe_timeout(),
            connect_probe_timeout_ms: default_connect_probe_timeout(),
            request_timeout_ms: default_request_timeout(),
            reconnect_budget: default_reconnect_budget(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            cache_ttl_secs: default_cache_ttl(),
            autostart: true,
            promote_interval_ms: default_promote_interval(),
            stable_connection_ms: default_stable_connection(),
        }
    }
}

impl SyncSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connect_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// `None` when the background check is disabled.
    pub fn promote_interval(&self) -> Option<Duration> {
        (self.promote_interval_ms > 0).then(|| Duration::from_millis(self.promote_interval_ms))
    }

    pub fn stable_connection(&self) -> Duration {
        Duration::from_millis(self.stable_connection_ms)
    }
}

// =============================================================================
// Paths
// =============================================================================

/// File locations. Unset entries resolve under the platform data dir.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub settings_file: Option<PathBuf>,

    #[serde(default)]
    pub database_file: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub paths: PathSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
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

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
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

        info!(?path, "Sync config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.is_empty() {
            return Err(SyncError::InvalidConfig("device.id must not be empty".into()));
        }

        if let Some(address) = &self.server.address {
            validation::normalize_server_address(address)?;
        }

        if !self.server.api_prefix.starts_with('/') {
            return Err(SyncError::InvalidConfig(format!(
                "server.api_prefix must start with '/', got: {}",
                self.server.api_prefix
            )));
        }

        if self.sync.reconnect_budget == 0 {
            return Err(SyncError::InvalidConfig(
                "reconnect_budget must be greater than 0".into(),
            ));
        }

        if self.sync.probe_timeout_ms == 0 || self.sync.connect_probe_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "probe timeouts must be greater than 0".into(),
            ));
        }

        if self.sync.initial_backoff_ms > self.sync.max_backoff_ms {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `KASSA_*` overrides from `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("KASSA_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup("KASSA_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(role) = lookup("KASSA_SERVER_ROLE") {
            match role.parse() {
                Ok(parsed) => self.device.role = parsed,
                Err(_) => warn!(role = %role, "Unknown server role in environment"),
            }
        }

        if let Some(address) = lookup("KASSA_SERVER_ADDRESS") {
            debug!(address = %address, "Overriding server address from environment");
            self.server.address = Some(address);
        }

        if let Some(port) = lookup("KASSA_SERVER_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.server.port = p;
            }
        }

        if let Some(ms) = lookup("KASSA_PROBE_TIMEOUT_MS") {
            if let Ok(v) = ms.parse::<u64>() {
                self.sync.probe_timeout_ms = v;
            }
        }

        if let Some(ms) = lookup("KASSA_PROMOTE_INTERVAL_MS") {
            if let Ok(v) = ms.parse::<u64>() {
                self.sync.promote_interval_ms = v;
            }
        }

        if let Some(budget) = lookup("KASSA_RECONNECT_BUDGET") {
            if let Ok(v) = budget.parse::<u32>() {
                self.sync.reconnect_budget = v;
            }
        }

        if let Some(dir) = lookup("KASSA_DATA_DIR") {
            self.paths.data_dir = Some(PathBuf::from(dir));
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "kassa", "pos").map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Directory for the settings file and local store.
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .or_else(|| ProjectDirs::from("com", "kassa", "pos").map(|d| d.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.paths
            .settings_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("settings.json"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.paths
            .database_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("kassa.db"))
    }
}

//! # Settings Store
//!
//! Persistent key/value settings for one terminal, kept as a flat JSON
//! object in `settings.json`.
//!
//! ## Keys
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  connection_mode   "local" | "network"      (written by SyncManager)   │
//! │  server_address    "http://192.168.1.50:3001"                          │
//! │  server_role       "server" | "client"                                 │
//! │  realtime_enabled  true | false                                        │
//! │  sync_queue        [QueueEntry, ...]        (written by SyncQueue)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every write rewrites the whole file through a temp file and a rename,
//! so a crash leaves either the old or the new contents. A file that does
//! not parse is moved aside to `settings.json.corrupt-<timestamp>` before
//! the store starts empty, so nothing in it is overwritten.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use kassa_core::{ConnectionMode, QueueEntry, ServerRole};

pub const KEY_CONNECTION_MODE: &str = "connection_mode";
pub const KEY_SERVER_ADDRESS: &str = "server_address";
pub const KEY_SERVER_ROLE: &str = "server_role";
pub const KEY_REALTIME_ENABLED: &str = "realtime_enabled";
pub const KEY_SYNC_QUEUE: &str = "sync_queue";

/// JSON-file backed settings.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl SettingsStore {
    /// Opens the settings file, starting empty if it does not exist.
    ///
    /// ## Errors
    /// `Settings` when the file can't be read, or when it is corrupt and
    /// can't be moved aside.
    pub async fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    let moved = quarantine(&path).await?;
                    warn!(
                        path = %path.display(),
                        moved_to = %moved.display(),
                        "Settings file is not a JSON object, moved aside and starting empty"
                    );
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Settings file not found, starting empty");
                Map::new()
            }
            Err(e) => return Err(SyncError::Settings(e.to_string())),
        };

        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    /// Non-persistent store for tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // =========================================================================
    // Raw Access
    // =========================================================================

    pub async fn get_raw(&self, key: &str) -> Option<Value> {
        self.values.lock().await.get(key).cloned()
    }

    /// Reads and decodes a key. Undecodable values read as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_raw(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "Ignoring undecodable setting");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> SyncResult<()> {
        let value = serde_json::to_value(value)?;
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value);
        self.persist(&values).await
    }

    pub async fn remove(&self, key: &str) -> SyncResult<()> {
        let mut values = self.values.lock().await;
        if values.remove(key).is_some() {
            self.persist(&values).await?;
        }
        Ok(())
    }

    async fn persist(&self, values: &Map<String, Value>) -> SyncResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SyncError::Settings(e.to_string()))?;
            }
        }

        let contents = serde_json::to_vec_pretty(values)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| SyncError::Settings(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| SyncError::Settings(e.to_string()))?;
        Ok(())
    }

    // =========================================================================
    // Typed Accessors
    // =========================================================================

    pub async fn connection_mode(&self) -> ConnectionMode {
        self.get(KEY_CONNECTION_MODE).await.unwrap_or_default()
    }

    pub async fn set_connection_mode(&self, mode: ConnectionMode) -> SyncResult<()> {
        self.set(KEY_CONNECTION_MODE, &mode).await
    }

    pub async fn server_address(&self) -> Option<String> {
        self.get::<String>(KEY_SERVER_ADDRESS)
            .await
            .filter(|s| !s.is_empty())
    }

    pub async fn set_server_address(&self, address: &str) -> SyncResult<()> {
        self.set(KEY_SERVER_ADDRESS, &address).await
    }

    pub async fn server_role(&self) -> Option<ServerRole> {
        self.get(KEY_SERVER_ROLE).await
    }

    pub async fn set_server_role(&self, role: ServerRole) -> SyncResult<()> {
        self.set(KEY_SERVER_ROLE, &role).await
    }

    pub async fn realtime_enabled(&self) -> bool {
        self.get(KEY_REALTIME_ENABLED).await.unwrap_or(false)
    }

    pub async fn set_realtime_enabled(&self, enabled: bool) -> SyncResult<()> {
        self.set(KEY_REALTIME_ENABLED, &enabled).await
    }

    /// Persisted queue items as stored, one JSON value per entry. A value
    /// that is not a list is kept as a single item.
    pub async fn queue_raw(&self) -> Vec<Value> {
        match self.get_raw(KEY_SYNC_QUEUE).await {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        }
    }

    pub async fn set_queue_raw(&self, items: Vec<Value>) -> SyncResult<()> {
        let mut values = self.values.lock().await;
        values.insert(KEY_SYNC_QUEUE.to_string(), Value::Array(items));
        self.persist(&values).await
    }

    /// Queue entries that decode. Undecodable items are skipped here but
    /// stay in the file.
    pub async fn queue(&self) -> Vec<QueueEntry> {
        self.queue_raw()
            .await
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()
    }

    pub async fn set_queue(&self, entries: &[QueueEntry]) -> SyncResult<()> {
        self.set(KEY_SYNC_QUEUE, &entries).await
    }
}

/// Renames an unparsable settings file out of the way.
async fn quarantine(path: &Path) -> SyncResult<PathBuf> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{stamp}"));
    let target = path.with_file_name(name);
    tokio::fs::rename(path, &target)
        .await
        .map_err(|e| SyncError::Settings(format!("cannot move corrupt settings aside: {e}")))?;
    Ok(target)
}

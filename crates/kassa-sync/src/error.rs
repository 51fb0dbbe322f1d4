//! # Sync Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Connectivity   │  │     Application         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Unreachable    │  │  Request{status,msg}    │ │
//! │  │  ConfigLoad/Save│  │  Timeout        │  │  InvalidMessage         │ │
//! │  │  AddressRejected│  │  Transport      │  │  Core                   │ │
//! │  │  NotConfigured  │  │  Disconnected   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Best-effort   │  │     Storage     │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  QueueReplay    │  │  LocalStore     │  │  Internal               │ │
//! │  │  PartialSnapshot│  │  Settings       │  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//! Address and reachability failures are absorbed by the `SyncManager`,
//! which forces local mode. Request errors go back to the immediate caller.
//! Queue and snapshot partial failures are reported, never raised.

use kassa_core::{CoreError, ValidationError};
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Server address refused (link-local, bad scheme, unparsable).
    /// Never applied.
    #[error("Server address rejected: {address}: {reason}")]
    AddressRejected { address: String, reason: String },

    /// No shared-store address has been configured yet.
    #[error("No server address configured")]
    NotConfigured,

    // =========================================================================
    // Connectivity Errors
    // =========================================================================
    /// Health probe failed or timed out.
    #[error("Shared store unreachable at {address}")]
    Unreachable { address: String },

    /// Operation did not complete within its bound.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Connection-level failure (refused, reset, DNS, TLS).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Realtime channel closed.
    #[error("Disconnected from shared store")]
    Disconnected,

    // =========================================================================
    // Application Errors
    // =========================================================================
    /// Completed HTTP exchange with a non-success status.
    #[error("Request failed ({status}): {message}")]
    Request { status: u16, message: String },

    /// Response or frame that could not be decoded.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Malformed write or record.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Best-effort Errors
    // =========================================================================
    /// A queued operation failed to apply; replay halted.
    #[error("Queue replay halted at {op} ({entry_id}) after {applied} applied: {reason}")]
    QueueReplay {
        entry_id: String,
        op: String,
        applied: usize,
        reason: String,
    },

    /// One or more snapshot resources could not be fetched.
    #[error("Partial snapshot, failed resources: {}", failed.join(", "))]
    PartialSnapshot { failed: Vec<String> },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local store failure.
    #[error("Local store error: {0}")]
    LocalStore(String),

    /// Settings file could not be read or written.
    #[error("Settings error: {0}")]
    Settings(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Sync layer is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        let address = match &err {
            ValidationError::LinkLocalAddress { address } => address.clone(),
            _ => String::new(),
        };
        SyncError::AddressRejected {
            address,
            reason: err.to_string(),
        }
    }
}

impl From<kassa_db::DbError> for SyncError {
    fn from(err: kassa_db::DbError) -> Self {
        SyncError::LocalStore(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidMessage(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::AddressRejected {
            address: String::new(),
            reason: err.to_string(),
        }
    }
}

/// ## Error Mapping
/// ```text
/// status error        → Request { status, message }
/// decode error        → InvalidMessage
/// connect/timeout/etc → Transport
/// ```
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SyncError::Request {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            };
        }
        if err.is_decode() {
            return SyncError::InvalidMessage(err.to_string());
        }
        SyncError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => SyncError::Disconnected,
            other => SyncError::Transport(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// True when the shared store could not be talked to at all. Writes
    /// that fail this way are parked in the durable queue.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            SyncError::Unreachable { .. }
                | SyncError::Timeout(_)
                | SyncError::Transport(_)
                | SyncError::Disconnected
        )
    }

    /// Returns true if the operation can be retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Request { status, .. } => *status >= 500 || *status == 429,
            SyncError::QueueReplay { .. } | SyncError::PartialSnapshot { .. } => true,
            other => other.is_connectivity(),
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::AddressRejected { .. }
                | SyncError::NotConfigured
        )
    }

    /// Stable code used in `SyncReport::error`.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::AddressRejected { .. } | SyncError::NotConfigured => "invalid-server-url",
            SyncError::Unreachable { .. } | SyncError::Timeout(_) => "server-unreachable",
            SyncError::Transport(_) | SyncError::Disconnected => "transport-error",
            SyncError::Request { .. } => "request-failed",
            SyncError::QueueReplay { .. } => "queue-replay-failed",
            SyncError::PartialSnapshot { .. } => "partial-snapshot",
            SyncError::LocalStore(_) => "local-store-error",
            SyncError::ShuttingDown => "shutting-down",
            _ => "unexpected-error",
        }
    }
}

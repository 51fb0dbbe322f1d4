//! # kassa-sync: Synchronization Layer for Kassa POS
//!
//! Decides whether a terminal talks to the network-shared store or its
//! local store, and keeps the two eventually consistent.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Layer Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  SyncManager (Orchestrator)                      │  │
//! │  │                                                                  │  │
//! │  │  Owns ConnectionMode (local | network)                          │  │
//! │  │  start_sync / stop_sync / submit / status                       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │SharedStoreClient│ │RealtimeSubscriber│ │  SyncQueue             │    │
//! │  │                │  │                │  │                        │    │
//! │  │ HTTP, TTL cache│  │ WebSocket,     │  │ FIFO pending writes,   │    │
//! │  │ health probe   │  │ budgeted       │  │ persisted in           │    │
//! │  │ link-local     │  │ reconnect      │  │ settings.json          │    │
//! │  │ rejection      │  │                │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                               │                                         │
//! │                               ▼                                         │
//! │               LocalStore (kassa-db SQLite)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`cache`] - TTL response cache
//! - [`client`] - Shared-store HTTP client
//! - [`config`] - Deployment configuration (`sync.toml`)
//! - [`context`] - Application-lifetime service bundle
//! - [`error`] - Sync error types
//! - [`local`] - Local store seam
//! - [`manager`] - `SyncManager` orchestrator
//! - [`protocol`] - Realtime frames and events
//! - [`queue`] - Durable queue
//! - [`realtime`] - WebSocket subscriber with reconnect budget
//! - [`settings`] - Runtime key/value settings
//! - [`snapshot`] - Snapshot builder
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kassa_sync::{SyncConfig, SyncContext};
//!
//! let config = SyncConfig::load_or_default(None);
//! let context = SyncContext::start(config, db).await?;
//!
//! let report = context.manager().start_sync("http://192.168.1.50:3001").await;
//! println!("network: {}", report.success);
//!
//! context.shutdown().await;
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod local;
pub mod manager;
pub mod protocol;
pub mod queue;
pub mod realtime;
pub mod settings;
pub mod snapshot;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{RequestOptions, SharedStore, SharedStoreClient};
pub use config::SyncConfig;
pub use context::SyncContext;
pub use error::{SyncError, SyncResult};
pub use local::LocalStore;
pub use manager::{
    NoOpEmitter, SyncEventEmitter, SyncManager, SyncReport, SyncStatus, WriteReceipt,
};
pub use protocol::{EventFrame, RealtimeEvent};
pub use queue::{QueueReport, SyncQueue};
pub use realtime::{ConnectionState, HandlerId, RealtimeConfig, RealtimeHandler, RealtimeSubscriber};
pub use settings::SettingsStore;
pub use snapshot::{build_snapshot, SnapshotOutcome};

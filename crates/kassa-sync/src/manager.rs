//! # Sync Manager
//!
//! The orchestrator. Owns the connection mode and wires the shared-store
//! client, realtime subscriber, durable queue and local store together.
//!
//! ## start_sync
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        start_sync(address)                              │
//! │                                                                         │
//! │  1. client.try_set_address ──✗──► mode=local, "invalid-server-url"     │
//! │  2. client.is_reachable(3s) ──✗──► disconnect, mode=local,             │
//! │                                    "server-unreachable"                │
//! │  3. realtime.connect           (best-effort)                           │
//! │  4. queue.process_queue        (stops at first failure)                │
//! │  5. build_snapshot             (failed kinds → empty, not authoritative)│
//! │  6. local.import_snapshot      (skips keys with pending writes)        │
//! │  7. register mirror handler    (idempotent)                            │
//! │  8. mode=network                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Auto-lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Connected         → start_sync again if mode is local or the channel  │
//! │                      dropped since the last sync                       │
//! │  Disconnected      → mark resync pending                               │
//! │  ConnectionFailed  → back to local, intent to sync kept                │
//! │                                                                         │
//! │  every promote_interval, while sync is wanted:                          │
//! │    local   + health probe ok → start_sync                              │
//! │    network + channel stopped → reopen channel, resync on Connected     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sync is wanted from the first accepted `start_sync` (or an `init` that
//! asks for network mode) until an explicit `stop_sync`.
//!
//! Lifecycle transitions are serialized by one mutex. Reactions to realtime
//! signals are spawned so the transport task never waits on them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{SharedStore, SharedStoreClient};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::local::LocalStore;
use crate::protocol::RealtimeEvent;
use crate::queue::SyncQueue;
use crate::realtime::{ConnectionState, HandlerId, RealtimeConfig, RealtimeHandler, RealtimeSubscriber};
use crate::settings::SettingsStore;
use crate::snapshot::build_snapshot;
use kassa_core::{
    validation, ChangeKind, ConnectionMode, EntityKind, Operation, Record, ServerRole,
};
use kassa_db::ImportOptions;

// =============================================================================
// Sync Status / Report
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub mode: ConnectionMode,
    pub connection_state: ConnectionState,
    pub is_connected: bool,
    pub server_address: Option<String>,

    /// Writes waiting in the durable queue.
    pub pending_count: usize,

    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Result of one `start_sync` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub success: bool,

    /// Stable error code (`invalid-server-url`, `server-unreachable`, ...).
    pub error: Option<&'static str>,

    pub queue_applied: usize,

    /// Entries still queued after replay.
    pub queue_pending: usize,

    /// Records written by the snapshot import.
    pub imported: usize,

    /// Snapshot kinds that failed to fetch.
    pub failed_resources: Vec<EntityKind>,
}

impl SyncReport {
    fn failure(code: &'static str) -> Self {
        Self {
            success: false,
            error: Some(code),
            ..Default::default()
        }
    }
}

/// Where a submitted write ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReceipt {
    /// The record as stored locally.
    pub record: Record,

    /// True when the write is parked in the durable queue.
    pub queued: bool,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Sink for status notifications (UI, tray icon, logs).
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, status: &SyncStatus);

    /// Queue progress after a replay pass.
    fn emit_progress(&self, pending: usize, applied: usize);

    fn emit_error(&self, message: &str, retryable: bool);
}

pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _pending: usize, _applied: usize) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Manager
// =============================================================================

struct Inner {
    config: SyncConfig,
    settings: Arc<SettingsStore>,
    client: Arc<SharedStoreClient>,
    realtime: RealtimeSubscriber,
    queue: Arc<SyncQueue>,
    local: Arc<dyn LocalStore>,
    emitter: Arc<dyn SyncEventEmitter>,

    mode: RwLock<ConnectionMode>,
    lifecycle: Mutex<()>,
    mirror_handler: Mutex<Option<HandlerId>>,
    lifecycle_handler: Mutex<Option<HandlerId>>,

    syncing: AtomicBool,
    resync_pending: AtomicBool,
    shutting_down: AtomicBool,
    /// Cleared only by an explicit `stop_sync`.
    sync_wanted: AtomicBool,
    promoter: Mutex<Option<JoinHandle<()>>>,

    last_sync: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

/// Cloneable handle to the orchestrator.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("device", &self.inner.config.device.id)
            .finish_non_exhaustive()
    }
}

impl SyncManager {
    pub async fn new(
        config: SyncConfig,
        settings: Arc<SettingsStore>,
        local: Arc<dyn LocalStore>,
    ) -> SyncResult<Self> {
        Self::with_emitter(config, settings, local, Arc::new(NoOpEmitter)).await
    }

    pub async fn with_emitter(
        config: SyncConfig,
        settings: Arc<SettingsStore>,
        local: Arc<dyn LocalStore>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> SyncResult<Self> {
        let client = Arc::new(SharedStoreClient::new(&config, settings.clone()).await?);
        let realtime = RealtimeSubscriber::new(client.clone(), RealtimeConfig::from_config(&config));
        let queue = Arc::new(SyncQueue::load(settings.clone()).await);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                settings,
                client,
                realtime,
                queue,
                local,
                emitter,
                mode: RwLock::new(ConnectionMode::Local),
                lifecycle: Mutex::new(()),
                mirror_handler: Mutex::new(None),
                lifecycle_handler: Mutex::new(None),
                syncing: AtomicBool::new(false),
                resync_pending: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                sync_wanted: AtomicBool::new(false),
                promoter: Mutex::new(None),
                last_sync: RwLock::new(None),
                last_error: RwLock::new(None),
            }),
        })
    }

    pub fn client(&self) -> &Arc<SharedStoreClient> {
        &self.inner.client
    }

    pub fn realtime(&self) -> &RealtimeSubscriber {
        &self.inner.realtime
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.inner.queue
    }

    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.inner.local
    }

    pub async fn mode(&self) -> ConnectionMode {
        *self.inner.mode.read().await
    }

    pub async fn status(&self) -> SyncStatus {
        let connection_state = self.inner.realtime.state().await;
        SyncStatus {
            mode: self.mode().await,
            connection_state,
            is_connected: connection_state == ConnectionState::Connected,
            server_address: self.inner.client.address().await,
            pending_count: self.inner.queue.len().await,
            last_sync: *self.inner.last_sync.read().await,
            last_error: self.inner.last_error.read().await.clone(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Startup sequence. Subscribes to realtime lifecycle signals and, if
    /// the persisted settings ask for network mode, probes once and starts
    /// sync when the shared store answers. Returns the report of that
    /// attempt, or `None` when none was made.
    pub async fn init(&self) -> Option<SyncReport> {
        self.register_lifecycle_handler().await;

        let settings = &self.inner.settings;
        let role = settings
            .server_role()
            .await
            .unwrap_or(self.inner.config.device.role);
        let persisted_mode = settings.connection_mode().await;
        let realtime_enabled = settings.realtime_enabled().await;

        let address = match self.inner.client.address().await {
            Some(address) => address,
            None if role == ServerRole::Server => {
                validation::loopback_address(self.inner.config.server.port)
            }
            None => {
                debug!("No shared-store address configured, staying local");
                return None;
            }
        };

        let wants_network = persisted_mode == ConnectionMode::Network
            || realtime_enabled
            || role == ServerRole::Server;
        if !self.inner.config.sync.autostart || !wants_network {
            debug!(mode = %persisted_mode, role = %role, "Autostart not requested, staying local");
            return None;
        }

        if let Err(e) = self.inner.client.try_set_address(&address).await {
            warn!(address = %address, error = %e, "Stored address rejected, staying local");
            return None;
        }
        self.want_sync().await;

        if !self
            .inner
            .client
            .is_reachable(self.inner.config.sync.probe_timeout())
            .await
        {
            info!(address = %address, "Shared store not reachable at startup, staying local");
            return None;
        }

        let base = self.inner.client.address().await.unwrap_or(address);
        Some(self.start_sync(&base).await)
    }

    /// Stops realtime and unregisters handlers. The persisted mode is left
    /// as is so the next start can resume.
    pub async fn shutdown(&self) {
        info!("Sync manager shutting down");
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        if let Some(task) = self.inner.promoter.lock().await.take() {
            task.abort();
        }
        let _guard = self.inner.lifecycle.lock().await;

        self.unregister_mirror_handler().await;
        if let Some(id) = self.inner.lifecycle_handler.lock().await.take() {
            self.inner.realtime.off(id).await;
        }
        self.inner.realtime.disconnect().await;
    }

    /// Switches to network mode against `address`. Never fails; the report
    /// carries the outcome.
    pub async fn start_sync(&self, address: &str) -> SyncReport {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return SyncReport::failure(SyncError::ShuttingDown.code());
        }

        let _guard = self.inner.lifecycle.lock().await;
        self.start_locked(address).await
    }

    /// Resync after the channel came back. Skipped when the channel has
    /// already dropped again by the time the lifecycle lock is free.
    async fn resync(&self) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let _guard = self.inner.lifecycle.lock().await;
        if !self.inner.sync_wanted.load(Ordering::SeqCst) {
            return;
        }
        if !self.inner.realtime.is_connected().await {
            debug!("Realtime channel gone again, resync skipped");
            return;
        }
        let Some(address) = self.inner.client.address().await else {
            return;
        };
        self.start_locked(&address).await;
    }

    async fn start_locked(&self, address: &str) -> SyncReport {
        self.inner.syncing.store(true, Ordering::SeqCst);
        self.inner.resync_pending.store(false, Ordering::SeqCst);

        let report = match self.run_start(address).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Sync start failed unexpectedly");
                self.go_local().await;
                self.record_error(&e).await;
                SyncReport::failure(e.code())
            }
        };

        self.inner.syncing.store(false, Ordering::SeqCst);
        self.publish_status().await;
        report
    }

    async fn run_start(&self, address: &str) -> SyncResult<SyncReport> {
        let inner = &self.inner;
        info!(address, "Starting sync");

        // 1. Address
        let base = match inner.client.try_set_address(address).await {
            Ok(base) => base,
            Err(e) => {
                warn!(address, error = %e, "Server address rejected");
                self.set_mode(ConnectionMode::Local).await?;
                self.record_error(&e).await;
                return Ok(SyncReport::failure(e.code()));
            }
        };

        self.want_sync().await;

        // 2. Reachability
        if !inner.client.is_reachable(inner.config.sync.probe_timeout()).await {
            let e = SyncError::Unreachable { address: base };
            warn!(error = %e, "Shared store unreachable, staying local");
            self.go_local().await;
            self.record_error(&e).await;
            return Ok(SyncReport::failure(e.code()));
        }

        // 3. Realtime
        self.register_lifecycle_handler().await;
        if let Err(e) = inner.realtime.connect(&base).await {
            warn!(error = %e, "Realtime channel unavailable, continuing without it");
        }

        // 4. Queue replay
        let replay = inner.queue.process_queue(inner.client.as_ref()).await;
        let queue_pending = inner.queue.len().await;
        inner.emitter.emit_progress(queue_pending, replay.applied);
        if let Some(e) = &replay.error {
            inner.emitter.emit_error(&e.to_string(), e.is_retryable());
        }

        // 5. Snapshot
        let outcome = build_snapshot(inner.client.as_ref()).await;
        if let Some(e) = outcome.error() {
            warn!(error = %e, "Continuing with partial snapshot");
            inner.emitter.emit_error(&e.to_string(), true);
        }

        // 6. Import
        let options = ImportOptions {
            protected: inner.queue.pending_keys().await,
            skip_kinds: outcome.failed.clone(),
        };
        let summary = inner.local.import_snapshot(&outcome.snapshot, &options).await?;

        // 7. Mirror remote writes
        self.register_mirror_handler().await;

        // 8. Mode
        self.set_mode(ConnectionMode::Network).await?;
        *inner.last_sync.write().await = Some(Utc::now());
        *inner.last_error.write().await = replay.error.as_ref().map(ToString::to_string);

        info!(
            applied = replay.applied,
            pending = queue_pending,
            imported = summary.upserted,
            removed = summary.removed,
            "Sync started"
        );

        Ok(SyncReport {
            success: true,
            error: None,
            queue_applied: replay.applied,
            queue_pending,
            imported: summary.upserted,
            failed_resources: outcome.failed,
        })
    }

    /// Back to local mode, and no background promotion until the next
    /// `start_sync`. Idempotent.
    pub async fn stop_sync(&self) {
        self.inner.sync_wanted.store(false, Ordering::SeqCst);
        self.demote().await;
    }

    /// Back to local mode after a failure. The background check may
    /// promote again.
    async fn demote(&self) {
        let _guard = self.inner.lifecycle.lock().await;
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        self.go_local().await;
        self.publish_status().await;
    }

    async fn want_sync(&self) {
        self.inner.sync_wanted.store(true, Ordering::SeqCst);
        self.ensure_promoter().await;
    }

    async fn ensure_promoter(&self) {
        let Some(period) = self.inner.config.sync.promote_interval() else {
            return;
        };
        let mut slot = self.inner.promoter.lock().await;
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        debug!(?period, "Starting background promotion check");
        *slot = Some(tokio::spawn(promote_loop(Arc::downgrade(&self.inner), period)));
    }

    /// One round of the background check.
    async fn promote_once(&self) {
        let inner = &self.inner;
        if !inner.sync_wanted.load(Ordering::SeqCst) || inner.syncing.load(Ordering::SeqCst) {
            return;
        }
        let Some(address) = inner.client.address().await else {
            return;
        };

        match self.mode().await {
            ConnectionMode::Local => {
                if !inner.client.is_reachable(inner.config.sync.probe_timeout()).await {
                    debug!(address = %address, "Shared store still unreachable");
                    return;
                }
                info!(address = %address, "Shared store reachable again, promoting to network mode");
                let report = self.start_sync(&address).await;
                if !report.success {
                    debug!(error = ?report.error, "Promotion attempt failed");
                }
            }
            ConnectionMode::Network => {
                let _guard = inner.lifecycle.lock().await;
                if *inner.mode.read().await != ConnectionMode::Network
                    || !inner.sync_wanted.load(Ordering::SeqCst)
                    || inner.realtime.is_running().await
                {
                    return;
                }
                debug!("Realtime channel stopped in network mode, reopening");
                inner.resync_pending.store(true, Ordering::SeqCst);
                if let Err(e) = inner.realtime.connect(&address).await {
                    debug!(error = %e, "Realtime channel still unavailable");
                }
            }
        }
    }

    async fn go_local(&self) {
        self.unregister_mirror_handler().await;
        if let Err(e) = self.set_mode(ConnectionMode::Local).await {
            warn!(error = %e, "Failed to persist local mode");
        }
        self.inner.realtime.disconnect().await;
    }

    async fn set_mode(&self, mode: ConnectionMode) -> SyncResult<()> {
        let mut current = self.inner.mode.write().await;
        let previous = *current;
        if previous != mode {
            info!(from = %previous, to = %mode, "Connection mode changed");
        }
        *current = mode;
        self.inner.settings.set_connection_mode(mode).await
    }

    async fn record_error(&self, e: &SyncError) {
        *self.inner.last_error.write().await = Some(e.to_string());
        self.inner.emitter.emit_error(&e.to_string(), e.is_retryable());
    }

    async fn publish_status(&self) {
        let status = self.status().await;
        self.inner.emitter.emit_status(&status);
    }

    // =========================================================================
    // Write Router
    // =========================================================================

    /// Applies a business write locally, then sends or queues it depending
    /// on the mode.
    ///
    /// In network mode a connectivity failure parks the write in the
    /// queue. A request error (e.g. validation) is returned; the local copy
    /// is reconciled by the next snapshot.
    pub async fn submit(&self, mut operation: Operation) -> SyncResult<WriteReceipt> {
        let kind = operation.op.entity_kind();
        if operation.op.change() == ChangeKind::Created && operation.payload.id().is_none() {
            operation.payload.set_id(Uuid::new_v4().to_string());
        }

        let record = self.apply_locally(kind, &operation).await?;
        let inner = &self.inner;

        if self.mode().await == ConnectionMode::Local {
            let pending = inner.queue.enqueue(operation).await?;
            debug!(pending, "Local mode, write queued");
            return Ok(WriteReceipt { record, queued: true });
        }

        // Keep FIFO order behind anything already queued
        if !inner.queue.is_empty().await {
            inner.queue.enqueue(operation).await?;
            let replay = inner.queue.process_queue(inner.client.as_ref()).await;
            inner.emitter.emit_progress(inner.queue.len().await, replay.applied);
            let queued = inner.queue.len().await > 0;
            return Ok(WriteReceipt { record, queued });
        }

        match inner.client.apply(&operation).await {
            Ok(Some(remote)) if operation.op.change() != ChangeKind::Deleted => {
                inner.local.upsert(kind, &remote).await?;
                Ok(WriteReceipt { record: remote, queued: false })
            }
            Ok(_) => Ok(WriteReceipt { record, queued: false }),
            Err(e) if e.is_connectivity() => {
                warn!(op = %operation.op, error = %e, "Shared store unreachable, write queued");
                inner.queue.enqueue(operation).await?;
                Ok(WriteReceipt { record, queued: true })
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_locally(&self, kind: EntityKind, operation: &Operation) -> SyncResult<Record> {
        let local = &self.inner.local;
        match operation.op.change() {
            ChangeKind::Created => local.create(kind, operation.payload.clone()).await,
            ChangeKind::Updated => {
                let id = required_id(operation)?;
                local.update(kind, &id, &operation.payload).await
            }
            ChangeKind::Deleted => {
                let id = required_id(operation)?;
                local.delete(kind, &id).await?;
                Ok(operation.payload.clone())
            }
        }
    }

    // =========================================================================
    // Realtime Handlers
    // =========================================================================

    async fn register_mirror_handler(&self) {
        let mut slot = self.inner.mirror_handler.lock().await;
        if slot.is_some() {
            return;
        }
        let handler = Arc::new(LocalMirror {
            local: self.inner.local.clone(),
        });
        *slot = Some(self.inner.realtime.on(handler).await);
        debug!("Realtime mirror handler registered");
    }

    async fn unregister_mirror_handler(&self) {
        if let Some(id) = self.inner.mirror_handler.lock().await.take() {
            self.inner.realtime.off(id).await;
            debug!("Realtime mirror handler removed");
        }
    }

    async fn register_lifecycle_handler(&self) {
        let mut slot = self.inner.lifecycle_handler.lock().await;
        if slot.is_some() {
            return;
        }
        let handler = Arc::new(LifecycleHandler {
            manager: Arc::downgrade(&self.inner),
        });
        *slot = Some(self.inner.realtime.on(handler).await);
    }
}

fn promote_loop(
    manager: Weak<Inner>,
    period: Duration,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(inner) = manager.upgrade() else {
                break;
            };
            if inner.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            SyncManager { inner }.promote_once().await;
        }
    })
}

fn required_id(operation: &Operation) -> SyncResult<String> {
    operation.payload.id().ok_or_else(|| {
        SyncError::Core(kassa_core::CoreError::MissingRecordId {
            operation: operation.op.to_string(),
        })
    })
}

/// Id of a relayed record. Delete events may carry a bare id.
fn event_record(payload: &Value) -> SyncResult<(Record, String)> {
    let record = match payload {
        Value::String(id) => {
            let mut record = Record::new();
            record.set_id(id.clone());
            record
        }
        other => Record::from_value(other.clone())
            .ok_or_else(|| SyncError::InvalidMessage("event payload is not an object".into()))?,
    };
    let id = record
        .id()
        .ok_or_else(|| SyncError::InvalidMessage("event payload has no id".into()))?;
    Ok((record, id))
}

/// Replays remote writes into the local store.
struct LocalMirror {
    local: Arc<dyn LocalStore>,
}

#[async_trait]
impl RealtimeHandler for LocalMirror {
    async fn handle(&self, event: &RealtimeEvent) -> SyncResult<()> {
        match event {
            RealtimeEvent::Entity { kind, change, payload } => {
                let (record, id) = event_record(payload)?;
                match change {
                    ChangeKind::Created => self.local.upsert(*kind, &record).await?,
                    ChangeKind::Updated => {
                        self.local.update(*kind, &id, &record).await?;
                    }
                    ChangeKind::Deleted => {
                        self.local.delete(*kind, &id).await?;
                    }
                }
                debug!(kind = %kind, change = %change, id, "Mirrored remote write");
            }
            RealtimeEvent::QuantityUpdated { payload } => {
                let (record, id) = event_record(payload)?;
                self.local.update(EntityKind::Product, &id, &record).await?;
                debug!(id, "Mirrored stock change");
            }
            _ => {}
        }
        Ok(())
    }
}

/// Reacts to transport lifecycle signals.
struct LifecycleHandler {
    manager: Weak<Inner>,
}

#[async_trait]
impl RealtimeHandler for LifecycleHandler {
    async fn handle(&self, event: &RealtimeEvent) -> SyncResult<()> {
        let Some(inner) = self.manager.upgrade() else {
            return Ok(());
        };
        if inner.shutting_down.load(Ordering::SeqCst) {
            return Ok(());
        }
        let manager = SyncManager { inner };

        match event {
            RealtimeEvent::Connected => {
                let resync = manager.inner.resync_pending.load(Ordering::SeqCst)
                    || manager.mode().await == ConnectionMode::Local;
                if resync && !manager.inner.syncing.load(Ordering::SeqCst) {
                    info!("Realtime channel back, resyncing");
                    tokio::spawn(async move { manager.resync().await });
                }
            }
            RealtimeEvent::Disconnected => {
                info!("Realtime channel lost");
                manager.inner.resync_pending.store(true, Ordering::SeqCst);
                manager.publish_status().await;
            }
            RealtimeEvent::ConnectionFailed { reason } => {
                warn!(reason = %reason, "Realtime connection failed, switching to local mode");
                manager.inner.emitter.emit_error(reason, true);
                tokio::spawn(async move { manager.demote().await });
            }
            _ => {}
        }
        Ok(())
    }
}

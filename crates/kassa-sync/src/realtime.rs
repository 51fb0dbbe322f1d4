//! # Realtime Subscriber
//!
//! Keeps a live WebSocket channel to the shared store, relays its domain
//! events to local handlers, and turns transport connects and failures
//! into lifecycle events.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Realtime Connection States                           │
//! │                                                                         │
//! │  connect(address)                                                      │
//! │     │ link-local? ──────────────────────► Err(AddressRejected)         │
//! │     │ pre-probe fails (2s)? ────────────► emit ConnectionFailed        │
//! │     ▼                                                                   │
//! │  ┌────────────┐    success     ┌────────────┐                          │
//! │  │ Connecting │ ─────────────► │ Connected  │ emit Connected           │
//! │  └─────┬──────┘                └─────┬──────┘                          │
//! │        │ error                       │ drop / close                    │
//! │        ▼                             ▼                                  │
//! │  attempts += 1               emit Disconnected                         │
//! │        ▲                     up >= stable_after? attempts = 0          │
//! │        └──── error, or closed before stable_after ┘                    │
//! │        │                             │                                  │
//! │        ├── attempts == budget (5) ───┴─► emit ConnectionFailed (once)  │
//! │        │                                 close, stop retrying          │
//! │        ▼                                                                │
//! │  ┌────────────┐  timer expired                                         │
//! │  │  Backoff   │ ─────────────► Connecting                              │
//! │  └────────────┘  500ms → 10s, exponential                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Handlers
//! Handlers run one at a time in registration order, on the transport
//! task, so remote events reach the local store in the order received.
//! An error or panic in one handler is logged and the next still runs.
//! Handlers must not call [`RealtimeSubscriber::connect`] or
//! [`RealtimeSubscriber::disconnect`] inline; spawn instead.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::SharedStoreClient;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{decode_frame, RealtimeEvent};
use kassa_core::validation;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `disconnect` waits for the transport task before aborting it.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Connection State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting before the next reconnect attempt.
    Backoff,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff => write!(f, "backoff"),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Channel path on the shared store (e.g. `/ws`).
    pub path: String,

    /// Probe bound before the channel is opened.
    pub connect_probe_timeout: Duration,

    /// WebSocket handshake bound.
    pub connect_timeout: Duration,

    /// Consecutive connection errors before giving up.
    pub reconnect_budget: u32,

    pub initial_backoff: Duration,
    pub max_backoff: Duration,

    /// Uptime after which a session counts as a successful connect.
    /// Shorter sessions count toward the budget.
    pub stable_after: Duration,

    /// Keepalive ping interval.
    pub ping_interval: Duration,
}

impl RealtimeConfig {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            path: config.server.realtime_path.clone(),
            connect_probe_timeout: config.sync.connect_probe_timeout(),
            connect_timeout: config.sync.request_timeout(),
            reconnect_budget: config.sync.reconnect_budget,
            initial_backoff: Duration::from_millis(config.sync.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.sync.max_backoff_ms),
            stable_after: config.sync.stable_connection(),
            ping_interval: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Observer for realtime events.
#[async_trait]
pub trait RealtimeHandler: Send + Sync {
    async fn handle(&self, event: &RealtimeEvent) -> SyncResult<()>;
}

/// Registration token returned by [`RealtimeSubscriber::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

// =============================================================================
// Subscriber
// =============================================================================

struct Session {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Shared {
    client: Arc<SharedStoreClient>,
    config: RealtimeConfig,
    state: RwLock<ConnectionState>,
    handlers: RwLock<Vec<(HandlerId, Arc<dyn RealtimeHandler>)>>,
    next_handler: AtomicU64,
    attempts: AtomicU32,
    /// Set once ConnectionFailed is emitted for an exhausted budget,
    /// cleared when a later session outlives `stable_after`.
    failure_reported: AtomicBool,
    session: Mutex<Option<Session>>,
}

/// Cloneable handle to the realtime subscriber.
#[derive(Clone)]
pub struct RealtimeSubscriber {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RealtimeSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSubscriber")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl RealtimeSubscriber {
    pub fn new(client: Arc<SharedStoreClient>, config: RealtimeConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                config,
                state: RwLock::new(ConnectionState::Disconnected),
                handlers: RwLock::new(Vec::new()),
                next_handler: AtomicU64::new(1),
                attempts: AtomicU32::new(0),
                failure_reported: AtomicBool::new(false),
                session: Mutex::new(None),
            }),
        }
    }

    // =========================================================================
    // Subscribe / Unsubscribe
    // =========================================================================

    pub async fn on(&self, handler: Arc<dyn RealtimeHandler>) -> HandlerId {
        let id = HandlerId(self.shared.next_handler.fetch_add(1, Ordering::SeqCst));
        self.shared.handlers.write().await.push((id, handler));
        id
    }

    /// Removes a handler. Returns whether it was registered.
    pub async fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.shared.handlers.write().await;
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    pub async fn handler_count(&self) -> usize {
        self.shared.handlers.read().await.len()
    }

    // =========================================================================
    // Connection
    // =========================================================================

    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// True while a transport task is connecting, connected or backing off.
    pub async fn is_running(&self) -> bool {
        self.shared
            .session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Opens the realtime channel to `address`. No-op while a session is
    /// running.
    ///
    /// ## Errors
    /// - `AddressRejected` for link-local or malformed addresses
    /// - `Unreachable` when the pre-connect probe fails; `ConnectionFailed`
    ///   is emitted first
    pub async fn connect(&self, address: &str) -> SyncResult<()> {
        let mut session = self.shared.session.lock().await;
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("Realtime session already running");
            return Ok(());
        }

        let base = validation::normalize_server_address(address)?;
        let url = validation::realtime_url(&base, &self.shared.config.path)?;

        if !self
            .shared
            .client
            .probe(&base, self.shared.config.connect_probe_timeout)
            .await
        {
            drop(session);
            warn!(address = %base, "Pre-connect probe failed, realtime channel not opened");
            self.shared
                .emit(&RealtimeEvent::ConnectionFailed {
                    reason: format!("{base} did not answer the health probe"),
                })
                .await;
            return Err(SyncError::Unreachable { address: base });
        }

        self.shared.attempts.store(0, Ordering::SeqCst);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(self.shared.clone(), url, shutdown_rx));
        *session = Some(Session { shutdown_tx, task });
        Ok(())
    }

    /// Closes the channel and stops reconnecting. Idempotent.
    pub async fn disconnect(&self) {
        let session = self.shared.session.lock().await.take();
        if let Some(Session { shutdown_tx, task }) = session {
            info!("Disconnecting realtime channel");
            let _ = shutdown_tx.send(true);
            let abort = task.abort_handle();
            if tokio::time::timeout(DISCONNECT_GRACE, task).await.is_err() {
                warn!("Realtime task did not stop in time, aborting");
                abort.abort();
            }
        }
        *self.shared.state.write().await = ConnectionState::Disconnected;
    }

    /// Consecutive connection errors since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl Shared {
    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    /// Delivers an event to every handler in registration order.
    async fn emit(&self, event: &RealtimeEvent) {
        let handlers: Vec<_> = self
            .handlers
            .read()
            .await
            .iter()
            .map(|(id, h)| (*id, h.clone()))
            .collect();

        for (id, handler) in handlers {
            match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(handler = id.0, event = %event.name(), error = %e, "Realtime handler failed")
                }
                Err(_) => {
                    error!(handler = id.0, event = %event.name(), "Realtime handler panicked")
                }
            }
        }
    }

    /// Counts a connection error. Returns true once the budget is spent.
    async fn record_failure(&self, error: &SyncError) -> bool {
        let attempts = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts < self.config.reconnect_budget {
            debug!(attempts, budget = self.config.reconnect_budget, error = %error, "Realtime connection error");
            return false;
        }

        warn!(attempts, "Reconnect budget exhausted, closing realtime channel");
        if !self.failure_reported.swap(true, Ordering::SeqCst) {
            self.emit(&RealtimeEvent::ConnectionFailed {
                reason: format!("{attempts} consecutive connection errors, last: {error}"),
            })
            .await;
        }
        true
    }
}

// =============================================================================
// Transport Task
// =============================================================================

enum LoopExit {
    Shutdown,
    RemoteClosed,
}

async fn run(shared: Arc<Shared>, url: Url, mut shutdown: watch::Receiver<bool>) {
    info!(url = %url, "Realtime subscriber starting");

    let mut backoff = ExponentialBackoff {
        initial_interval: shared.config.initial_backoff,
        max_interval: shared.config.max_backoff,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };
    backoff.reset();

    loop {
        if *shutdown.borrow() {
            break;
        }

        shared.set_state(ConnectionState::Connecting).await;

        let connected = tokio::select! {
            result = open_channel(&url, shared.config.connect_timeout) => result,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok(ws) => {
                info!("Realtime channel connected");
                let connected_at = Instant::now();
                shared.set_state(ConnectionState::Connected).await;
                shared.emit(&RealtimeEvent::Connected).await;

                let outcome = connection_loop(&shared, ws, &mut shutdown).await;

                // Only a session that outlives `stable_after` clears the budget.
                let stable = connected_at.elapsed() >= shared.config.stable_after;
                if stable {
                    backoff.reset();
                    shared.attempts.store(0, Ordering::SeqCst);
                    shared.failure_reported.store(false, Ordering::SeqCst);
                }

                shared.set_state(ConnectionState::Disconnected).await;
                shared.emit(&RealtimeEvent::Disconnected).await;

                match outcome {
                    Ok(LoopExit::Shutdown) => break,
                    Ok(LoopExit::RemoteClosed) if stable => {
                        info!("Realtime channel closed by shared store")
                    }
                    Ok(LoopExit::RemoteClosed) => {
                        warn!(uptime = ?connected_at.elapsed(), "Realtime channel closed right after connecting");
                        if shared.record_failure(&SyncError::Disconnected).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Realtime channel dropped");
                        if shared.record_failure(&e).await {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to open realtime channel");
                if shared.record_failure(&e).await {
                    break;
                }
            }
        }

        shared.set_state(ConnectionState::Backoff).await;
        let Some(delay) = backoff.next_backoff() else {
            break;
        };
        debug!(?delay, attempt = shared.attempts.load(Ordering::SeqCst), "Waiting before reconnect");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    shared.set_state(ConnectionState::Disconnected).await;
    info!("Realtime subscriber stopped");
}

async fn open_channel(url: &Url, bound: Duration) -> SyncResult<WsStream> {
    match tokio::time::timeout(bound, connect_async(url.as_str())).await {
        Ok(Ok((ws, response))) => {
            debug!(status = ?response.status(), "WebSocket handshake complete");
            Ok(ws)
        }
        Ok(Err(e)) => Err(SyncError::from(e)),
        Err(_) => Err(SyncError::Timeout(bound.as_millis() as u64)),
    }
}

async fn connection_loop(
    shared: &Shared,
    ws: WsStream,
    shutdown: &mut watch::Receiver<bool>,
) -> SyncResult<LoopExit> {
    let (mut write, mut read) = ws.split();

    let mut ping_interval = tokio::time::interval(shared.config.ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    None => return Ok(LoopExit::RemoteClosed),
                    Some(Ok(WsMessage::Text(text))) => match decode_frame(&text) {
                        Ok(Some(event)) => {
                            debug!(event = %event.name(), "Realtime event received");
                            shared.emit(&event).await;
                        }
                        Ok(None) => debug!("Ignoring frame on unrelayed topic"),
                        Err(e) => warn!(error = %e, "Failed to parse realtime frame"),
                    },
                    Some(Ok(WsMessage::Ping(data))) => {
                        write.send(WsMessage::Pong(data)).await?;
                    }
                    Some(Ok(WsMessage::Pong(_))) => debug!("Received pong"),
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "Received close frame");
                        return Ok(LoopExit::RemoteClosed);
                    }
                    Some(Ok(WsMessage::Binary(_))) => warn!("Received unexpected binary message"),
                    Some(Ok(WsMessage::Frame(_))) => {}
                    Some(Err(e)) => return Err(SyncError::from(e)),
                }
            }

            _ = ping_interval.tick() => {
                write.send(WsMessage::Ping(Default::default())).await?;
            }

            _ = shutdown.changed() => {
                let _ = write.send(WsMessage::Close(None)).await;
                return Ok(LoopExit::Shutdown);
            }
        }
    }
}

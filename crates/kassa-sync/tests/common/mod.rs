//! In-process fake shared store: the REST API under `/api` plus a `/ws`
//! channel that forwards published frames to every connected terminal.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use kassa_db::{Database, DbConfig};
use kassa_sync::{EventFrame, SettingsStore, SyncConfig, SyncManager};

#[derive(Debug, Clone, PartialEq)]
pub struct WriteCall {
    pub method: &'static str,
    pub resource: String,
    pub body: Value,
}

pub struct FakeState {
    records: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
    write_budget: Mutex<Option<usize>>,
    writes: Mutex<Vec<WriteCall>>,
    events: broadcast::Sender<String>,
    kicks: broadcast::Sender<()>,
    ws_enabled: AtomicBool,
    healthy: AtomicBool,
    close_on_connect: AtomicBool,
    requests: AtomicUsize,
}

pub struct FakeStore {
    pub addr: SocketAddr,
    pub state: Arc<FakeState>,
    task: JoinHandle<()>,
}

impl Drop for FakeStore {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FakeStore {
    pub async fn start() -> Self {
        let (events, _) = broadcast::channel(64);
        let (kicks, _) = broadcast::channel(4);
        let state = Arc::new(FakeState {
            records: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            write_budget: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            events,
            kicks,
            ws_enabled: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            close_on_connect: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/health", get(health))
            .route("/api/{resource}", get(list).post(create))
            .route("/api/{resource}/{id}", get(fetch).put(update).delete(remove))
            .route("/ws", get(realtime))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn seed(&self, resource: &str, records: Vec<Value>) {
        self.state
            .records
            .lock()
            .unwrap()
            .insert(resource.to_string(), records);
    }

    pub fn records(&self, resource: &str) -> Vec<Value> {
        self.state
            .records
            .lock()
            .unwrap()
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes `GET /api/<resource>` answer 500.
    pub fn fail_resource(&self, resource: &str) {
        self.state.failing.lock().unwrap().insert(resource.to_string());
    }

    /// Accepts `n` more writes, then answers 503. `None` lifts the limit.
    pub fn write_budget(&self, n: Option<usize>) {
        *self.state.write_budget.lock().unwrap() = n;
    }

    pub fn set_realtime(&self, enabled: bool) {
        self.state.ws_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Makes `/api/health` answer 503 while `false`.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Closes every open `/ws` session from the server side.
    pub fn drop_realtime_sessions(&self) {
        let _ = self.state.kicks.send(());
    }

    /// Completes the handshake, then closes each new session at once.
    pub fn set_close_on_connect(&self, enabled: bool) {
        self.state.close_on_connect.store(enabled, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.state.writes.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn publish(&self, frame: EventFrame) {
        let _ = self.state.events.send(frame.to_json().unwrap());
    }
}

fn take_write(state: &FakeState) -> bool {
    let mut budget = state.write_budget.lock().unwrap();
    match budget.as_mut() {
        Some(0) => false,
        Some(n) => {
            *n -= 1;
            true
        }
        None => true,
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn health(State(state): State<Arc<FakeState>>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !state.healthy.load(Ordering::SeqCst) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "starting");
    }
    Json(json!({ "status": "ok" })).into_response()
}

async fn list(State(state): State<Arc<FakeState>>, Path(resource): Path<String>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if state.failing.lock().unwrap().contains(&resource) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "resource unavailable");
    }
    let records = state
        .records
        .lock()
        .unwrap()
        .get(&resource)
        .cloned()
        .unwrap_or_default();
    Json(Value::Array(records)).into_response()
}

async fn fetch(
    State(state): State<Arc<FakeState>>,
    Path((resource, id)): Path<(String, String)>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let records = state.records.lock().unwrap();
    match records
        .get(&resource)
        .and_then(|rs| rs.iter().find(|r| r["id"] == json!(id)))
    {
        Some(record) => Json(record.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn create(
    State(state): State<Arc<FakeState>>,
    Path(resource): Path<String>,
    Json(mut body): Json<Value>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !take_write(&state) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "busy");
    }
    if body.get("id").is_none() {
        body["id"] = json!(uuid::Uuid::new_v4().to_string());
    }
    state.writes.lock().unwrap().push(WriteCall {
        method: "POST",
        resource: resource.clone(),
        body: body.clone(),
    });
    state
        .records
        .lock()
        .unwrap()
        .entry(resource)
        .or_default()
        .push(body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn update(
    State(state): State<Arc<FakeState>>,
    Path((resource, id)): Path<(String, String)>,
    Json(patch): Json<Value>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !take_write(&state) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "busy");
    }
    state.writes.lock().unwrap().push(WriteCall {
        method: "PUT",
        resource: resource.clone(),
        body: patch.clone(),
    });
    let mut records = state.records.lock().unwrap();
    let Some(record) = records
        .get_mut(&resource)
        .and_then(|rs| rs.iter_mut().find(|r| r["id"] == json!(id)))
    else {
        return error(StatusCode::NOT_FOUND, "not found");
    };
    if let (Some(target), Some(fields)) = (record.as_object_mut(), patch.as_object()) {
        for (k, v) in fields {
            target.insert(k.clone(), v.clone());
        }
    }
    Json(record.clone()).into_response()
}

async fn remove(
    State(state): State<Arc<FakeState>>,
    Path((resource, id)): Path<(String, String)>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !take_write(&state) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "busy");
    }
    state.writes.lock().unwrap().push(WriteCall {
        method: "DELETE",
        resource: resource.clone(),
        body: json!({ "id": id }),
    });
    if let Some(rs) = state.records.lock().unwrap().get_mut(&resource) {
        rs.retain(|r| r["id"] != json!(id));
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn realtime(State(state): State<Arc<FakeState>>, ws: WebSocketUpgrade) -> Response {
    if !state.ws_enabled.load(Ordering::SeqCst) {
        return StatusCode::NOT_FOUND.into_response();
    }
    // Subscribe before the handshake completes so no frame published after
    // the client sees `Connected` is missed.
    let rx = state.events.subscribe();
    let kicks = state.kicks.subscribe();
    let close_at_once = state.close_on_connect.load(Ordering::SeqCst);
    ws.on_upgrade(move |socket| forward(socket, rx, kicks, close_at_once))
}

async fn forward(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<String>,
    mut kicks: broadcast::Receiver<()>,
    close_at_once: bool,
) {
    if close_at_once {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    loop {
        tokio::select! {
            _ = kicks.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            frame = rx.recv() => match frame {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Config tuned for fast tests against the fake store.
pub fn fast_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.sync.probe_timeout_ms = 1_000;
    config.sync.connect_probe_timeout_ms = 1_000;
    config.sync.request_timeout_ms = 2_000;
    config.sync.initial_backoff_ms = 10;
    config.sync.max_backoff_ms = 50;
    config.sync.stable_connection_ms = 300;
    // Background promotion is switched on per test.
    config.sync.promote_interval_ms = 0;
    config
}

pub struct Terminal {
    pub manager: SyncManager,
    pub db: Arc<Database>,
    pub settings: Arc<SettingsStore>,
}

pub async fn terminal() -> Terminal {
    terminal_with(fast_config(), Arc::new(SettingsStore::in_memory())).await
}

pub async fn terminal_with(config: SyncConfig, settings: Arc<SettingsStore>) -> Terminal {
    let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
    let manager = SyncManager::new(config, settings.clone(), db.clone())
        .await
        .unwrap();
    Terminal {
        manager,
        db,
        settings,
    }
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

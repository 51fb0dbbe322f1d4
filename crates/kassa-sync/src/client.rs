//! # Shared-Store Client
//!
//! Typed request surface to the shared store's HTTP API, with a read cache
//! and address validation.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  list(Product)                                                         │
//! │     │                                                                   │
//! │     ├── cache hit (< TTL)? ──────────────────────────► cached value    │
//! │     ▼                                                                   │
//! │  request("/products", GET)                                             │
//! │     │  GET {base}{api_prefix}/products                                 │
//! │     │  Accept: application/json                                        │
//! │     ▼                                                                   │
//! │  2xx  → JSON body → cache put                                          │
//! │  4xx/5xx → SyncError::Request { status, message from {"error": ..} }  │
//! │  connect/timeout → SyncError::Transport                                │
//! │                                                                         │
//! │  create/update/delete → request(...) then cache.clear()                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::settings::SettingsStore;
use kassa_core::{validation, ChangeKind, EntityKind, Operation, Record};

// =============================================================================
// SharedStore Trait
// =============================================================================

/// The slice of the shared store the queue and snapshot builder rely on.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// All records of one kind.
    async fn list(&self, kind: EntityKind) -> SyncResult<Vec<Record>>;

    /// Sends one write. Returns the record echoed by the server, if any.
    async fn apply(&self, operation: &Operation) -> SyncResult<Option<Record>>;
}

// =============================================================================
// Request Options
// =============================================================================

/// Method, body and query for [`SharedStoreClient::request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::with_method(Method::GET)
    }

    pub fn post(body: Value) -> Self {
        Self::with_method(Method::POST).body(body)
    }

    pub fn put(body: Value) -> Self {
        Self::with_method(Method::PUT).body(body)
    }

    pub fn delete() -> Self {
        Self::with_method(Method::DELETE)
    }

    fn with_method(method: Method) -> Self {
        Self {
            method,
            body: None,
            query: Vec::new(),
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    fn is_mutation(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }
}

// =============================================================================
// Shared-Store Client
// =============================================================================

/// HTTP client to the shared store.
#[derive(Debug)]
pub struct SharedStoreClient {
    http: reqwest::Client,
    settings: Arc<SettingsStore>,
    base: RwLock<Option<String>>,
    cache: ResponseCache,
    api_prefix: String,
    health_path: String,
    request_timeout: Duration,
}

impl SharedStoreClient {
    /// Builds the client. The starting address comes from the settings
    /// file, falling back to `server.address` in the config.
    pub async fn new(config: &SyncConfig, settings: Arc<SettingsStore>) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client: {e}")))?;

        let stored = match settings.server_address().await {
            Some(address) => Some(address),
            None => config.server.address.clone(),
        };
        let base = stored.and_then(|raw| match validation::normalize_server_address(&raw) {
            Ok(address) => Some(address),
            Err(e) => {
                warn!(address = %raw, error = %e, "Ignoring stored server address");
                None
            }
        });

        Ok(Self {
            http,
            settings,
            base: RwLock::new(base),
            cache: ResponseCache::new(config.sync.cache_ttl()),
            api_prefix: config.server.api_prefix.trim_end_matches('/').to_string(),
            health_path: config.server.health_path.clone(),
            request_timeout: config.sync.request_timeout(),
        })
    }

    // =========================================================================
    // Address
    // =========================================================================

    /// Current normalized base address.
    pub async fn address(&self) -> Option<String> {
        self.base.read().await.clone()
    }

    /// Validates, persists and applies a base address.
    ///
    /// Returns false and keeps the previous address when the address is
    /// link-local or malformed, or when it can't be persisted.
    pub async fn set_address(&self, raw: &str) -> bool {
        match self.try_set_address(raw).await {
            Ok(_) => true,
            Err(e) => {
                warn!(address = %raw, error = %e, "Server address not applied");
                false
            }
        }
    }

    /// [`set_address`](Self::set_address) with the failure reason.
    pub async fn try_set_address(&self, raw: &str) -> SyncResult<String> {
        let normalized = validation::normalize_server_address(raw).map_err(|e| {
            SyncError::AddressRejected {
                address: raw.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut base = self.base.write().await;
        self.settings.set_server_address(&normalized).await?;
        if base.as_deref() != Some(normalized.as_str()) {
            info!(address = %normalized, "Shared store address set");
            self.cache.clear().await;
        }
        *base = Some(normalized.clone());
        Ok(normalized)
    }

    async fn require_base(&self) -> SyncResult<String> {
        self.address().await.ok_or(SyncError::NotConfigured)
    }

    // =========================================================================
    // Reachability
    // =========================================================================

    /// Bounded-time health probe. Any timeout, transport error or non-2xx
    /// status yields false.
    pub async fn is_reachable(&self, timeout: Duration) -> bool {
        let Some(base) = self.address().await else {
            return false;
        };
        self.probe(&base, timeout).await
    }

    /// Health probe against an arbitrary normalized base address.
    pub async fn probe(&self, base: &str, timeout: Duration) -> bool {
        let url = format!("{base}{}{}", self.api_prefix, self.health_path);

        match tokio::time::timeout(timeout, self.http.get(&url).send()).await {
            Ok(Ok(response)) if response.status().is_success() => true,
            Ok(Ok(response)) => {
                debug!(url = %url, status = %response.status(), "Health probe rejected");
                false
            }
            Ok(Err(e)) => {
                debug!(url = %url, error = %e, "Health probe failed");
                false
            }
            Err(_) => {
                debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "Health probe timed out");
                false
            }
        }
    }

    // =========================================================================
    // Raw Request
    // =========================================================================

    /// Sends one request under the API prefix and decodes the JSON body.
    ///
    /// Mutating methods clear the cache once the exchange completes, even
    /// on error statuses, since the server may have applied part of it.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> SyncResult<Value> {
        let base = self.require_base().await?;
        let url = format!("{base}{}{endpoint}", self.api_prefix);
        let mutation = options.is_mutation();

        let mut builder = self
            .http
            .request(options.method.clone(), &url)
            .header(ACCEPT, "application/json")
            .timeout(self.request_timeout);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        debug!(method = %options.method, url = %url, "Shared store request");
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(self.request_timeout.as_millis() as u64)
            } else {
                SyncError::from(e)
            }
        })?;

        if mutation {
            self.cache.clear().await;
        }

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(SyncError::Request {
                status: status.as_u16(),
                message: error_message(status, &text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_cached(&self, key: String, endpoint: &str, options: RequestOptions) -> SyncResult<Value> {
        if let Some(hit) = self.cache.get(&key).await {
            debug!(key = %key, "Cache hit");
            return Ok(hit);
        }
        let generation = self.cache.generation().await;
        let value = self.request(endpoint, options).await?;
        self.cache.put(key, value.clone(), generation).await;
        Ok(value)
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    // =========================================================================
    // Typed Surface
    // =========================================================================

    /// Lists every record of a kind.
    pub async fn list_records(&self, kind: EntityKind) -> SyncResult<Vec<Record>> {
        let endpoint = format!("/{}", kind.resource());
        let value = self
            .get_cached(kind.resource().to_string(), &endpoint, RequestOptions::get())
            .await?;
        decode_records(value)
    }

    /// Lists every record of a kind from the server, bypassing and then
    /// refreshing the cache.
    pub async fn fetch_records(&self, kind: EntityKind) -> SyncResult<Vec<Record>> {
        let endpoint = format!("/{}", kind.resource());
        let generation = self.cache.generation().await;
        let value = self.request(&endpoint, RequestOptions::get()).await?;
        self.cache.put(kind.resource(), value.clone(), generation).await;
        decode_records(value)
    }

    /// Server-side search (`GET /<resource>?q=<query>`).
    pub async fn search(&self, kind: EntityKind, query: &str) -> SyncResult<Vec<Record>> {
        let endpoint = format!("/{}", kind.resource());
        let key = format!("{}?q={}", kind.resource(), query);
        let value = self
            .get_cached(key, &endpoint, RequestOptions::get().query("q", query))
            .await?;
        decode_records(value)
    }

    /// One record by key. A 404 reads as `None`.
    pub async fn get(&self, kind: EntityKind, id: &str) -> SyncResult<Option<Record>> {
        let endpoint = record_path(kind, id);
        let key = endpoint.trim_start_matches('/').to_string();
        match self.get_cached(key, &endpoint, RequestOptions::get()).await {
            Ok(value) => Ok(Record::from_value(value)),
            Err(SyncError::Request { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create(&self, kind: EntityKind, record: &Record) -> SyncResult<Record> {
        let endpoint = format!("/{}", kind.resource());
        let value = self
            .request(&endpoint, RequestOptions::post(record.clone().into_value()))
            .await?;
        Ok(Record::from_value(value).unwrap_or_else(|| record.clone()))
    }

    pub async fn update(&self, kind: EntityKind, id: &str, patch: &Record) -> SyncResult<Record> {
        let value = self
            .request(&record_path(kind, id), RequestOptions::put(patch.clone().into_value()))
            .await?;
        Ok(Record::from_value(value).unwrap_or_else(|| patch.clone()))
    }

    pub async fn delete(&self, kind: EntityKind, id: &str) -> SyncResult<()> {
        self.request(&record_path(kind, id), RequestOptions::delete())
            .await?;
        Ok(())
    }

    /// Aggregate endpoint passthrough (`GET /stats/<name>`).
    pub async fn stats(&self, name: &str) -> SyncResult<Value> {
        let endpoint = format!("/stats/{}", encode_segment(name));
        self.get_cached(format!("stats/{name}"), &endpoint, RequestOptions::get())
            .await
    }
}

#[async_trait]
impl SharedStore for SharedStoreClient {
    async fn list(&self, kind: EntityKind) -> SyncResult<Vec<Record>> {
        self.fetch_records(kind).await
    }

    async fn apply(&self, operation: &Operation) -> SyncResult<Option<Record>> {
        let kind = operation.op.entity_kind();
        match operation.op.change() {
            ChangeKind::Created => self.create(kind, &operation.payload).await.map(Some),
            ChangeKind::Updated => {
                let id = record_id(operation)?;
                self.update(kind, &id, &operation.payload).await.map(Some)
            }
            ChangeKind::Deleted => {
                let id = record_id(operation)?;
                self.delete(kind, &id).await.map(|_| None)
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn record_id(operation: &Operation) -> SyncResult<String> {
    operation.payload.id().ok_or_else(|| {
        SyncError::Core(kassa_core::CoreError::MissingRecordId {
            operation: operation.op.to_string(),
        })
    })
}

fn record_path(kind: EntityKind, id: &str) -> String {
    format!("/{}/{}", kind.resource(), encode_segment(id))
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn decode_records(value: Value) -> SyncResult<Vec<Record>> {
    match value {
        Value::Array(items) => Ok(items.into_iter().filter_map(Record::from_value).collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(SyncError::InvalidMessage(format!(
            "expected a JSON array, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Server-provided message from a JSON error body, else the status text.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["error", "message"]
                .iter()
                .find_map(|field| v.get(*field).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kassa_core::OperationType;
    use serde_json::json;

    async fn client() -> SharedStoreClient {
        SharedStoreClient::new(&SyncConfig::default(), Arc::new(SettingsStore::in_memory()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_address_rejects_link_local() {
        let client = client().await;
        assert!(client.set_address("http://192.168.1.50:3001/").await);
        assert_eq!(
            client.address().await.as_deref(),
            Some("http://192.168.1.50:3001")
        );

        assert!(!client.set_address("http://169.254.10.5:3001").await);
        assert_eq!(
            client.address().await.as_deref(),
            Some("http://192.168.1.50:3001")
        );
        assert_eq!(
            client.settings.server_address().await.as_deref(),
            Some("http://192.168.1.50:3001")
        );
    }

    #[tokio::test]
    async fn test_starting_address_from_settings_wins() {
        let settings = Arc::new(SettingsStore::in_memory());
        settings.set_server_address("http://10.0.0.5:3001").await.unwrap();

        let mut config = SyncConfig::default();
        config.server.address = Some("http://10.0.0.9:3001".into());

        let client = SharedStoreClient::new(&config, settings).await.unwrap();
        assert_eq!(client.address().await.as_deref(), Some("http://10.0.0.5:3001"));
    }

    #[tokio::test]
    async fn test_requests_without_address() {
        let client = client().await;
        assert!(!client.is_reachable(Duration::from_millis(100)).await);
        assert!(matches!(
            client.list_records(EntityKind::Product).await,
            Err(SyncError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_apply_delete_without_id() {
        let client = client().await;
        client.set_address("http://127.0.0.1:9").await;
        let op = Operation {
            op: OperationType::DeleteProduct,
            payload: Record::new(),
        };
        assert!(matches!(client.apply(&op).await, Err(SyncError::Core(_))));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error": "name is required"}"#),
            "name is required"
        );
        assert_eq!(
            error_message(StatusCode::CONFLICT, r#"{"message": "duplicate sku"}"#),
            "duplicate sku"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>upstream</html>"),
            "Bad Gateway"
        );
    }

    #[test]
    fn test_decode_records() {
        let records = decode_records(json!([{"id": "p-1"}, 3, {"id": "p-2"}])).unwrap();
        assert_eq!(records.len(), 2);
        assert!(decode_records(json!({"id": "p-1"})).is_err());
        assert!(decode_records(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_record_path_encodes_id() {
        assert_eq!(record_path(EntityKind::SupplierInvoice, "s/1"), "/supplier-invoices/s%2F1");
    }
}

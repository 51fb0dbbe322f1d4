//! End-to-end sync scenarios against the fake shared store.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use common::{eventually, fast_config, terminal, terminal_with, FakeStore};
use kassa_core::{ConnectionMode, EntityKind, Operation, OperationType};
use kassa_sync::{ConnectionState, SettingsStore, SyncError};

fn seed_all(store: &FakeStore) {
    store.seed("products", vec![json!({"id": "p-1", "name": "Apple", "price": 0.3})]);
    store.seed("locations", vec![json!({"id": "l-1", "name": "Front"})]);
    store.seed("invoices", vec![json!({"id": "i-1", "total": 12.5})]);
    store.seed("supplier-invoices", vec![json!({"id": "s-1", "supplier": "Fresh Co"})]);
    store.seed("employees", vec![json!({"id": "e-1", "name": "Dana"})]);
}

fn create_product(name: &str, price: f64) -> Operation {
    Operation::from_value(OperationType::CreateProduct, json!({"name": name, "price": price})).unwrap()
}

#[tokio::test]
async fn test_offline_write_replays_then_snapshot_imports() {
    let store = FakeStore::start().await;
    seed_all(&store);
    let t = terminal().await;

    assert_eq!(t.manager.mode().await, ConnectionMode::Local);
    let receipt = t.manager.submit(create_product("Banana", 0.5)).await.unwrap();
    assert!(receipt.queued);
    assert_eq!(t.manager.queue().len().await, 1);
    assert_eq!(store.request_count(), 0);

    let report = t.manager.start_sync(&store.base()).await;

    assert!(report.success, "{report:?}");
    assert_eq!(report.queue_applied, 1);
    assert_eq!(report.queue_pending, 0);
    assert!(report.failed_resources.is_empty());
    assert!(t.manager.queue().is_empty().await);
    assert_eq!(t.manager.mode().await, ConnectionMode::Network);
    assert_eq!(t.settings.connection_mode().await, ConnectionMode::Network);

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].resource, "products");
    assert_eq!(writes[0].body["name"], json!("Banana"));

    // Snapshot wins for remote rows and carries the replayed write back
    let products = t.db.records().list(EntityKind::Product).await.unwrap();
    assert_eq!(products.len(), 2);
    let banana_id = receipt.record.id().unwrap();
    assert!(t.db.records().get(EntityKind::Product, &banana_id).await.unwrap().is_some());
    assert_eq!(t.db.records().count(EntityKind::Employee).await.unwrap(), 1);
    assert_eq!(t.db.records().count(EntityKind::SupplierInvoice).await.unwrap(), 1);

    t.manager.shutdown().await;
}

#[tokio::test]
async fn test_link_local_address_is_rejected_without_network_calls() {
    let store = FakeStore::start().await;
    let t = terminal().await;
    assert!(t.manager.client().set_address(&store.base()).await);

    let report = t.manager.start_sync("http://169.254.1.1:3001").await;

    assert!(!report.success);
    assert_eq!(report.error, Some("invalid-server-url"));
    assert_eq!(t.manager.mode().await, ConnectionMode::Local);
    assert_eq!(t.manager.client().address().await, Some(store.base()));
    assert_eq!(store.request_count(), 0);
}

#[tokio::test]
async fn test_probe_resolves_false_within_its_bound() {
    // Accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hold = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let t = terminal().await;
    assert!(t.manager.client().set_address(&format!("http://{addr}")).await);

    let started = Instant::now();
    let reachable = t.manager.client().is_reachable(Duration::from_millis(300)).await;

    assert!(!reachable);
    assert!(started.elapsed() < Duration::from_millis(1_000));

    let report = t.manager.start_sync(&format!("http://{addr}")).await;
    assert_eq!(report.error, Some("server-unreachable"));
    assert_eq!(t.manager.mode().await, ConnectionMode::Local);
    hold.abort();
}

#[tokio::test]
async fn test_partial_snapshot_keeps_failed_kind_untouched() {
    let store = FakeStore::start().await;
    seed_all(&store);
    store.fail_resource("employees");
    let t = terminal().await;

    let local = kassa_core::Record::from_value(json!({"id": "e-local", "name": "Offline hire"})).unwrap();
    t.db.records().upsert(EntityKind::Employee, &local).await.unwrap();

    let report = t.manager.start_sync(&store.base()).await;

    assert!(report.success);
    assert_eq!(report.failed_resources, vec![EntityKind::Employee]);
    for kind in [
        EntityKind::Product,
        EntityKind::Location,
        EntityKind::Invoice,
        EntityKind::SupplierInvoice,
    ] {
        assert_eq!(t.db.records().count(kind).await.unwrap(), 1, "{kind}");
    }
    assert!(t.db.records().get(EntityKind::Employee, "e-local").await.unwrap().is_some());
    assert_eq!(t.manager.mode().await, ConnectionMode::Network);

    t.manager.shutdown().await;
}

#[tokio::test]
async fn test_stop_sync_twice_matches_once() {
    let store = FakeStore::start().await;
    seed_all(&store);
    let t = terminal().await;
    let manager = &t.manager;

    assert!(t.manager.start_sync(&store.base()).await.success);
    assert!(eventually(|| async move { manager.realtime().is_connected().await }).await);

    t.manager.stop_sync().await;
    let once = t.manager.status().await;
    t.manager.stop_sync().await;
    let twice = t.manager.status().await;

    for status in [&once, &twice] {
        assert_eq!(status.mode, ConnectionMode::Local);
        assert_eq!(status.connection_state, ConnectionState::Disconnected);
        assert!(!status.is_connected);
    }
    assert!(!t.manager.realtime().is_running().await);
    assert_eq!(t.settings.connection_mode().await, ConnectionMode::Local);
}

#[tokio::test]
async fn test_queue_halts_at_failing_entry_and_resumes() {
    let store = FakeStore::start().await;
    seed_all(&store);
    store.write_budget(Some(2));
    let t = terminal().await;

    for (name, price) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
        t.manager.submit(create_product(name, price)).await.unwrap();
    }

    let report = t.manager.start_sync(&store.base()).await;

    assert!(report.success);
    assert_eq!(report.queue_applied, 2);
    assert_eq!(report.queue_pending, 2);
    let remaining: Vec<_> = t
        .manager
        .queue()
        .entries()
        .await
        .iter()
        .map(|e| e.payload["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(remaining, vec!["c", "d"]);

    // Pending writes survive the import even though the server lacks them
    assert_eq!(t.db.records().count(EntityKind::Product).await.unwrap(), 5);
    assert!(t.manager.status().await.last_error.is_some());

    store.write_budget(None);
    t.manager.stop_sync().await;
    let report = t.manager.start_sync(&store.base()).await;

    assert!(report.success);
    assert_eq!(report.queue_applied, 2);
    assert!(t.manager.queue().is_empty().await);
    let names: Vec<_> = store.writes().iter().map(|w| w.body["name"].clone()).collect();
    assert_eq!(names, vec![json!("a"), json!("b"), json!("c"), json!("d")]);

    t.manager.shutdown().await;
}

#[tokio::test]
async fn test_network_write_goes_straight_to_shared_store() {
    let store = FakeStore::start().await;
    seed_all(&store);
    let t = terminal().await;
    assert!(t.manager.start_sync(&store.base()).await.success);

    let receipt = t.manager.submit(create_product("Kiwi", 0.8)).await.unwrap();
    assert!(!receipt.queued);
    assert!(t.manager.queue().is_empty().await);
    assert_eq!(store.records("products").len(), 2);

    let update = Operation::from_value(
        OperationType::UpdateProduct,
        json!({"id": "p-1", "price": 0.35}),
    )
    .unwrap();
    let receipt = t.manager.submit(update).await.unwrap();
    assert_eq!(receipt.record.get("name"), Some(&json!("Apple")));

    let missing = Operation::from_value(OperationType::UpdateEmployee, json!({"id": "ghost"})).unwrap();
    let err = t.manager.submit(missing).await.unwrap_err();
    assert!(matches!(err, SyncError::Request { status: 404, .. }));

    t.manager.shutdown().await;
}

#[tokio::test]
async fn test_init_autostarts_from_persisted_network_mode() {
    let store = FakeStore::start().await;
    seed_all(&store);

    let dir = tempfile::tempdir().unwrap();
    let settings = Arc::new(SettingsStore::open(dir.path().join("settings.json")).await.unwrap());
    settings.set_connection_mode(ConnectionMode::Network).await.unwrap();
    settings.set_server_address(&store.base()).await.unwrap();

    let t = terminal_with(fast_config(), settings).await;
    let report = t.manager.init().await.expect("autostart attempted");

    assert!(report.success);
    assert_eq!(t.manager.mode().await, ConnectionMode::Network);
    assert_eq!(t.db.records().count(EntityKind::Product).await.unwrap(), 1);

    t.manager.shutdown().await;
}

#[tokio::test]
async fn test_init_stays_local_when_server_absent() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Arc::new(SettingsStore::open(dir.path().join("settings.json")).await.unwrap());
    settings.set_connection_mode(ConnectionMode::Network).await.unwrap();
    settings.set_server_address("http://127.0.0.1:9").await.unwrap();

    let t = terminal_with(fast_config(), settings.clone()).await;

    assert!(t.manager.init().await.is_none());
    assert_eq!(t.manager.mode().await, ConnectionMode::Local);
    // Persisted intent is kept for the next start
    assert_eq!(settings.connection_mode().await, ConnectionMode::Network);
}

#[tokio::test]
async fn test_background_check_promotes_after_server_returns() {
    let store = FakeStore::start().await;
    seed_all(&store);
    store.set_healthy(false);
    let mut config = fast_config();
    config.sync.promote_interval_ms = 200;
    let t = terminal_with(config, Arc::new(SettingsStore::in_memory())).await;
    let manager = &t.manager;

    let report = t.manager.start_sync(&store.base()).await;
    assert_eq!(report.error, Some("server-unreachable"));
    assert_eq!(t.manager.mode().await, ConnectionMode::Local);

    store.set_healthy(true);
    assert!(eventually(|| async move { manager.mode().await == ConnectionMode::Network }).await);
    assert!(eventually(|| async move { manager.realtime().is_connected().await }).await);
    assert_eq!(t.db.records().count(EntityKind::Product).await.unwrap(), 1);

    // An explicit stop ends background promotion
    t.manager.stop_sync().await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(t.manager.mode().await, ConnectionMode::Local);
    assert!(!t.manager.realtime().is_running().await);

    t.manager.shutdown().await;
}

#[tokio::test]
async fn test_background_check_recovers_after_connection_failed() {
    let store = FakeStore::start().await;
    seed_all(&store);
    store.set_realtime(false);
    let mut config = fast_config();
    config.sync.promote_interval_ms = 500;
    let t = terminal_with(config, Arc::new(SettingsStore::in_memory())).await;
    let manager = &t.manager;

    assert!(t.manager.start_sync(&store.base()).await.success);
    assert!(eventually(|| async move { manager.mode().await == ConnectionMode::Local }).await);

    store.set_realtime(true);
    assert!(
        eventually(|| async move {
            manager.mode().await == ConnectionMode::Network
                && manager.realtime().is_connected().await
        })
        .await
    );

    t.manager.shutdown().await;
}

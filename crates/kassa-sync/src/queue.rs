//! # Durable Queue
//!
//! Writes that could not reach the shared store, persisted in the settings
//! file under `sync_queue` and replayed in insertion order.
//!
//! ## Replay Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       process_queue(store)                              │
//! │                                                                         │
//! │   sync_queue: [ e1 | e2 | e3 | e4 ]         (FIFO, enqueue appends)    │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │   head = e1 ──► decode ──✗──► warn, drop e1, continue                 │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │   store.apply(op) ──ok──► remove e1, persist, next                     │
//! │                  │                                                      │
//! │                  ✗                                                      │
//! │                  ▼                                                      │
//! │   stop: QueueReport { succeeded: false, applied, error }               │
//! │         e1..en stay queued, in order                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Items in `sync_queue` are decoded one by one. An item that does not
//! decode as a queue entry keeps its place in the file and is skipped by
//! replay with a warning; it is never rewritten away.
//!
//! The entry lock is never held across a network call, so `enqueue` does
//! not wait on a replay in flight. Replays themselves are serialized.
//! Every change is persisted before the in-memory list is updated.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::SharedStore;
use crate::error::{SyncError, SyncResult};
use crate::settings::SettingsStore;
use kassa_core::{EntityKey, Operation, QueueEntry};

/// Outcome of one replay pass.
#[derive(Debug)]
pub struct QueueReport {
    /// True when every replayable entry was applied.
    pub succeeded: bool,

    /// Entries applied and removed in this pass.
    pub applied: usize,

    /// Entries with an unknown operation, dropped in this pass.
    pub dropped: usize,

    /// Undecodable items left in place.
    pub skipped: usize,

    /// The failure that halted replay, as `SyncError::QueueReplay`.
    pub error: Option<SyncError>,
}

/// One persisted item.
#[derive(Debug, Clone)]
enum Slot {
    Entry(QueueEntry),
    /// Kept verbatim so a later version can still read it.
    Unreadable(Value),
}

impl Slot {
    fn decode(item: Value) -> Self {
        match serde_json::from_value::<QueueEntry>(item.clone()) {
            Ok(entry) => Slot::Entry(entry),
            Err(e) => {
                warn!(error = %e, "Queue item does not decode, keeping it untouched");
                Slot::Unreadable(item)
            }
        }
    }

    fn entry(&self) -> Option<&QueueEntry> {
        match self {
            Slot::Entry(entry) => Some(entry),
            Slot::Unreadable(_) => None,
        }
    }

    fn to_value(&self) -> SyncResult<Value> {
        match self {
            Slot::Entry(entry) => Ok(serde_json::to_value(entry)?),
            Slot::Unreadable(item) => Ok(item.clone()),
        }
    }
}

/// FIFO queue of pending writes.
#[derive(Debug)]
pub struct SyncQueue {
    settings: Arc<SettingsStore>,
    slots: Mutex<Vec<Slot>>,
    replay: Mutex<()>,
}

impl SyncQueue {
    /// Loads the persisted queue.
    pub async fn load(settings: Arc<SettingsStore>) -> Self {
        let slots: Vec<Slot> = settings.queue_raw().await.into_iter().map(Slot::decode).collect();
        let pending = slots.iter().filter(|s| s.entry().is_some()).count();
        let unreadable = slots.len() - pending;
        if !slots.is_empty() {
            info!(pending, unreadable, "Loaded pending sync queue");
        }
        Self {
            settings,
            slots: Mutex::new(slots),
            replay: Mutex::new(()),
        }
    }

    /// Appends a write. Returns the new queue length.
    pub async fn enqueue(&self, operation: Operation) -> SyncResult<usize> {
        let entry = QueueEntry::new(operation);
        let mut slots = self.slots.lock().await;
        debug!(entry_id = %entry.id, op = %entry.op, "Queueing write");

        let mut next = slots.clone();
        next.push(Slot::Entry(entry));
        self.persist(&next).await?;
        *slots = next;
        Ok(replayable(&slots))
    }

    /// Replayable entries waiting.
    pub async fn len(&self) -> usize {
        replayable(&self.slots.lock().await)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Persisted items that could not be decoded.
    pub async fn unreadable(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.len() - replayable(&slots)
    }

    pub async fn entries(&self) -> Vec<QueueEntry> {
        self.slots
            .lock()
            .await
            .iter()
            .filter_map(Slot::entry)
            .cloned()
            .collect()
    }

    /// Drops every replayable entry. Unreadable items stay.
    pub async fn clear(&self) -> SyncResult<()> {
        let mut slots = self.slots.lock().await;
        let next: Vec<Slot> = slots
            .iter()
            .filter(|s| s.entry().is_none())
            .cloned()
            .collect();
        self.persist(&next).await?;
        *slots = next;
        Ok(())
    }

    /// Entity keys that have at least one pending write.
    pub async fn pending_keys(&self) -> HashSet<EntityKey> {
        self.slots
            .lock()
            .await
            .iter()
            .filter_map(Slot::entry)
            .filter_map(QueueEntry::entity_key)
            .collect()
    }

    /// Replays queued writes in order until the queue is empty or one
    /// fails.
    pub async fn process_queue(&self, store: &dyn SharedStore) -> QueueReport {
        let _replay = self.replay.lock().await;
        let mut applied = 0;
        let mut dropped = 0;

        let skipped = self.unreadable().await;
        if skipped > 0 {
            warn!(skipped, "Skipping undecodable queue items");
        }

        loop {
            let head = self
                .slots
                .lock()
                .await
                .iter()
                .find_map(Slot::entry)
                .cloned();
            let Some(head) = head else {
                break;
            };

            let operation = match head.operation() {
                Ok(op) => op,
                Err(e) => {
                    warn!(entry_id = %head.id, op = %head.op, error = %e, "Dropping unreplayable queue entry");
                    if let Err(e) = self.remove(&head.id).await {
                        return halted(&head, applied, dropped, skipped, e);
                    }
                    dropped += 1;
                    continue;
                }
            };

            if let Err(e) = store.apply(&operation).await {
                return halted(&head, applied, dropped, skipped, e);
            }

            if let Err(e) = self.remove(&head.id).await {
                return halted(&head, applied, dropped, skipped, e);
            }
            applied += 1;
            debug!(entry_id = %head.id, op = %head.op, "Replayed queued write");
        }

        if applied > 0 || dropped > 0 {
            info!(applied, dropped, "Sync queue drained");
        }
        QueueReport {
            succeeded: true,
            applied,
            dropped,
            skipped,
            error: None,
        }
    }

    async fn remove(&self, id: &str) -> SyncResult<()> {
        let mut slots = self.slots.lock().await;
        let next: Vec<Slot> = slots
            .iter()
            .filter(|s| s.entry().map_or(true, |e| e.id != id))
            .cloned()
            .collect();
        self.persist(&next).await?;
        *slots = next;
        Ok(())
    }

    async fn persist(&self, slots: &[Slot]) -> SyncResult<()> {
        let items = slots.iter().map(Slot::to_value).collect::<SyncResult<Vec<_>>>()?;
        self.settings.set_queue_raw(items).await
    }
}

fn replayable(slots: &[Slot]) -> usize {
    slots.iter().filter(|s| s.entry().is_some()).count()
}

fn halted(
    head: &QueueEntry,
    applied: usize,
    dropped: usize,
    skipped: usize,
    cause: SyncError,
) -> QueueReport {
    warn!(entry_id = %head.id, op = %head.op, applied, error = %cause, "Queue replay halted");
    QueueReport {
        succeeded: false,
        applied,
        dropped,
        skipped,
        error: Some(SyncError::QueueReplay {
            entry_id: head.id.clone(),
            op: head.op.clone(),
            applied,
            reason: cause.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kassa_core::{EntityKind, OperationType, Record};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    /// Accepts writes until `fail_at` calls have been made.
    struct FlakyStore {
        fail_at: Option<usize>,
        seen: StdMutex<Vec<String>>,
    }

    impl FlakyStore {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fail_at,
                seen: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SharedStore for FlakyStore {
        async fn list(&self, _kind: EntityKind) -> SyncResult<Vec<Record>> {
            Ok(Vec::new())
        }

        async fn apply(&self, operation: &Operation) -> SyncResult<Option<Record>> {
            let mut seen = self.seen.lock().unwrap();
            if Some(seen.len()) == self.fail_at {
                return Err(SyncError::Transport("connection refused".into()));
            }
            seen.push(operation.payload.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string());
            Ok(None)
        }
    }

    fn create(name: &str) -> Operation {
        Operation::from_value(OperationType::CreateProduct, json!({ "name": name })).unwrap()
    }

    fn names(entries: &[QueueEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.payload["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_enqueue_returns_length_and_persists() {
        let settings = Arc::new(SettingsStore::in_memory());
        let queue = SyncQueue::load(settings.clone()).await;

        assert_eq!(queue.enqueue(create("a")).await.unwrap(), 1);
        assert_eq!(queue.enqueue(create("b")).await.unwrap(), 2);
        assert_eq!(settings.queue().await.len(), 2);

        let reloaded = SyncQueue::load(settings).await;
        assert_eq!(names(&reloaded.entries().await), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_replay_drains_in_order() {
        let queue = SyncQueue::load(Arc::new(SettingsStore::in_memory())).await;
        for name in ["a", "b", "c"] {
            queue.enqueue(create(name)).await.unwrap();
        }

        let store = FlakyStore::new(None);
        let report = queue.process_queue(&store).await;

        assert!(report.succeeded);
        assert_eq!(report.applied, 3);
        assert!(queue.is_empty().await);
        assert_eq!(*store.seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_replay_stops_at_first_failure() {
        let settings = Arc::new(SettingsStore::in_memory());
        let queue = SyncQueue::load(settings.clone()).await;
        for name in ["a", "b", "c", "d"] {
            queue.enqueue(create(name)).await.unwrap();
        }

        // Third entry fails
        let report = queue.process_queue(&FlakyStore::new(Some(2))).await;

        assert!(!report.succeeded);
        assert_eq!(report.applied, 2);
        assert!(matches!(report.error, Some(SyncError::QueueReplay { applied: 2, .. })));
        assert_eq!(names(&queue.entries().await), vec!["c", "d"]);
        assert_eq!(names(&settings.queue().await), vec!["c", "d"]);

        // Next recovery drains the rest
        let report = queue.process_queue(&FlakyStore::new(None)).await;
        assert!(report.succeeded);
        assert_eq!(report.applied, 2);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_dropped_without_halting() {
        let settings = Arc::new(SettingsStore::in_memory());
        let mut bogus = QueueEntry::new(create("bogus"));
        bogus.op = "archiveProduct".to_string();
        settings.set_queue(&[bogus, QueueEntry::new(create("a"))]).await.unwrap();

        let queue = SyncQueue::load(settings).await;
        let store = FlakyStore::new(None);
        let report = queue.process_queue(&store).await;

        assert!(report.succeeded);
        assert_eq!(report.applied, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(*store.seen.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_pending_keys_only_cover_identified_writes() {
        let queue = SyncQueue::load(Arc::new(SettingsStore::in_memory())).await;
        queue.enqueue(create("no id yet")).await.unwrap();
        queue
            .enqueue(Operation::from_value(OperationType::DeleteEmployee, json!({"id": "e-1"})).unwrap())
            .await
            .unwrap();

        let keys = queue.pending_keys().await;
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&EntityKey::new(EntityKind::Employee, "e-1")));

        queue.clear().await.unwrap();
        assert!(queue.pending_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_item_survives_restart_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Arc::new(SettingsStore::open(&path).await.unwrap());
        let queue = SyncQueue::load(settings.clone()).await;
        for name in ["a", "b", "c"] {
            queue.enqueue(create(name)).await.unwrap();
        }

        // Damage entry b on disk
        let mut items = settings.queue_raw().await;
        items[1].as_object_mut().unwrap().remove("enqueuedAt");
        settings.set_queue_raw(items).await.unwrap();
        drop(queue);
        drop(settings);

        let settings = Arc::new(SettingsStore::open(&path).await.unwrap());
        let queue = SyncQueue::load(settings.clone()).await;
        assert_eq!(names(&queue.entries().await), vec!["a", "c"]);
        assert_eq!(queue.unreadable().await, 1);

        queue.enqueue(create("d")).await.unwrap();
        assert_eq!(settings.queue_raw().await.len(), 4);

        let store = FlakyStore::new(None);
        let report = queue.process_queue(&store).await;
        assert!(report.succeeded);
        assert_eq!(report.applied, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(*store.seen.lock().unwrap(), vec!["a", "c", "d"]);
        assert!(queue.is_empty().await);

        let left = settings.queue_raw().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0]["payload"]["name"], json!("b"));
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_queue_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("state");
        let settings = Arc::new(SettingsStore::open(blocked.join("settings.json")).await.unwrap());
        let queue = SyncQueue::load(settings).await;

        // A file where the settings directory should be
        std::fs::write(&blocked, "").unwrap();
        assert!(queue.enqueue(create("a")).await.is_err());
        assert!(queue.is_empty().await);

        std::fs::remove_file(&blocked).unwrap();
        assert_eq!(queue.enqueue(create("a")).await.unwrap(), 1);
        assert_eq!(names(&queue.entries().await), vec!["a"]);
    }
}

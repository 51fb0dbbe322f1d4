//! # Snapshot Builder
//!
//! Pulls every aggregate resource from the shared store concurrently.
//! A resource that fails contributes an empty slice and is reported in
//! `failed`; the others are kept.

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::client::SharedStore;
use crate::error::SyncError;
use kassa_core::{EntityKind, Snapshot};

#[derive(Debug, Default)]
pub struct SnapshotOutcome {
    pub snapshot: Snapshot,

    /// Kinds whose fetch failed. Their slice in `snapshot` is empty and
    /// must not be treated as authoritative.
    pub failed: Vec<EntityKind>,
}

impl SnapshotOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `PartialSnapshot` error describing the failed kinds, if any.
    pub fn error(&self) -> Option<SyncError> {
        if self.failed.is_empty() {
            return None;
        }
        Some(SyncError::PartialSnapshot {
            failed: self.failed.iter().map(|k| k.resource().to_string()).collect(),
        })
    }
}

pub async fn build_snapshot(store: &dyn SharedStore) -> SnapshotOutcome {
    let fetches = EntityKind::SNAPSHOT.map(|kind| async move { (kind, store.list(kind).await) });

    let mut outcome = SnapshotOutcome::default();
    for (kind, result) in join_all(fetches).await {
        match result {
            Ok(records) => {
                debug!(kind = %kind, count = records.len(), "Fetched snapshot resource");
                outcome.snapshot.set_records(kind, records);
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Snapshot resource failed, using empty slice");
                outcome.failed.push(kind);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncResult;
    use async_trait::async_trait;
    use kassa_core::{Operation, Record};
    use serde_json::json;

    struct OneBroken(EntityKind);

    #[async_trait]
    impl SharedStore for OneBroken {
        async fn list(&self, kind: EntityKind) -> SyncResult<Vec<Record>> {
            if kind == self.0 {
                return Err(SyncError::Request {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(vec![Record::from_value(json!({"id": format!("{}-1", kind.topic())})).unwrap()])
        }

        async fn apply(&self, _operation: &Operation) -> SyncResult<Option<Record>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_failed_resource_degrades_to_empty() {
        let outcome = build_snapshot(&OneBroken(EntityKind::Employee)).await;

        assert_eq!(outcome.failed, vec![EntityKind::Employee]);
        assert!(outcome.snapshot.employees.is_empty());
        for kind in [
            EntityKind::Product,
            EntityKind::Location,
            EntityKind::Invoice,
            EntityKind::SupplierInvoice,
        ] {
            assert_eq!(outcome.snapshot.records(kind).len(), 1, "{kind}");
        }
        assert!(matches!(
            outcome.error(),
            Some(SyncError::PartialSnapshot { failed }) if failed == vec!["employees".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_absences_are_not_part_of_snapshot() {
        let outcome = build_snapshot(&OneBroken(EntityKind::Absence)).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.snapshot.total(), 5);
    }
}

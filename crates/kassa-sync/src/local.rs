//! # Local Store Seam
//!
//! What the sync layer needs from the terminal's embedded store. The
//! SQLite [`Database`] from `kassa-db` is the production implementation.

use async_trait::async_trait;

use crate::error::SyncResult;
use kassa_core::{EntityKind, Record, Snapshot};
use kassa_db::{Database, ImportOptions, ImportSummary};

#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Idempotent replace of local data with a snapshot.
    async fn import_snapshot(
        &self,
        snapshot: &Snapshot,
        options: &ImportOptions,
    ) -> SyncResult<ImportSummary>;

    /// Inserts with a fresh id when the record has none.
    async fn create(&self, kind: EntityKind, record: Record) -> SyncResult<Record>;

    /// Merges `patch` into the stored record, inserting if absent.
    async fn update(&self, kind: EntityKind, id: &str, patch: &Record) -> SyncResult<Record>;

    /// Inserts or replaces a record that carries its id.
    async fn upsert(&self, kind: EntityKind, record: &Record) -> SyncResult<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, kind: EntityKind, id: &str) -> SyncResult<bool>;

    async fn get(&self, kind: EntityKind, id: &str) -> SyncResult<Option<Record>>;

    async fn list(&self, kind: EntityKind) -> SyncResult<Vec<Record>>;
}

#[async_trait]
impl LocalStore for Database {
    async fn import_snapshot(
        &self,
        snapshot: &Snapshot,
        options: &ImportOptions,
    ) -> SyncResult<ImportSummary> {
        Ok(self.records().import_snapshot(snapshot, options).await?)
    }

    async fn create(&self, kind: EntityKind, record: Record) -> SyncResult<Record> {
        Ok(self.records().create(kind, record).await?)
    }

    async fn update(&self, kind: EntityKind, id: &str, patch: &Record) -> SyncResult<Record> {
        Ok(self.records().update(kind, id, patch).await?)
    }

    async fn upsert(&self, kind: EntityKind, record: &Record) -> SyncResult<()> {
        Ok(self.records().upsert(kind, record).await?)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> SyncResult<bool> {
        Ok(self.records().delete(kind, id).await?)
    }

    async fn get(&self, kind: EntityKind, id: &str) -> SyncResult<Option<Record>> {
        Ok(self.records().get(kind, id).await?)
    }

    async fn list(&self, kind: EntityKind) -> SyncResult<Vec<Record>> {
        Ok(self.records().list(kind).await?)
    }
}

//! # Record Repository
//!
//! Storage for every entity kind, plus the snapshot import that reconciles
//! the local store with the shared store.
//!
//! ## Snapshot Import
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION, per kind                          │
//! │                                                                         │
//! │  kind in ImportOptions::skip_kinds?  → leave local rows untouched      │
//! │                                                                         │
//! │  for record in snapshot[kind]:                                         │
//! │     (kind, id) protected?            → skip (pending local write)      │
//! │     no id?                           → skip                            │
//! │     else                             → UPSERT                          │
//! │                                                                         │
//! │  for local row not in snapshot[kind]:                                  │
//! │     protected?                       → keep                            │
//! │     else                             → DELETE                          │
//! │                                                                         │
//! │  COMMIT ← import is a replace, so applying it twice changes nothing    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use kassa_core::{EntityKey, EntityKind, Record, Snapshot};

// =============================================================================
// Import Options / Summary
// =============================================================================

/// Controls which local rows a snapshot import may touch.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Records with a pending queued write. Neither overwritten nor deleted.
    pub protected: HashSet<EntityKey>,

    /// Kinds whose fetch failed. Their empty slice is not authoritative.
    pub skip_kinds: Vec<EntityKind>,
}

/// What a snapshot import did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub upserted: usize,
    pub removed: usize,
    pub skipped: usize,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for local records.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    /// Inserts a new record, assigning a UUID v4 `id` if it has none.
    pub async fn create(&self, kind: EntityKind, mut record: Record) -> DbResult<Record> {
        if record.id().is_none() {
            record.set_id(Uuid::new_v4().to_string());
        }
        self.upsert(kind, &record).await?;
        Ok(record)
    }

    /// Merges `patch` into the stored record, inserting it if absent.
    pub async fn update(&self, kind: EntityKind, id: &str, patch: &Record) -> DbResult<Record> {
        let mut conn = self.pool.acquire().await?;
        let mut record = fetch_one(&mut conn, kind, id).await?.unwrap_or_default();
        record.merge(patch);
        record.set_id(id);
        write(&mut conn, kind, id, &record).await?;
        Ok(record)
    }

    /// Inserts or replaces a record by its `id`.
    pub async fn upsert(&self, kind: EntityKind, record: &Record) -> DbResult<()> {
        let id = record
            .id()
            .ok_or_else(|| DbError::InvalidRecord(format!("{kind} record has no id")))?;
        let mut conn = self.pool.acquire().await?;
        write(&mut conn, kind, &id, record).await
    }

    /// Deletes a record. Returns whether a row existed.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE kind = ?1 AND id = ?2")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> DbResult<Option<Record>> {
        let mut conn = self.pool.acquire().await?;
        fetch_one(&mut conn, kind, id).await
    }

    /// All records of a kind, oldest write first.
    pub async fn list(&self, kind: EntityKind) -> DbResult<Vec<Record>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT data FROM records WHERE kind = ?1 ORDER BY updated_at, id",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|data| decode(data)).collect()
    }

    pub async fn count(&self, kind: EntityKind) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE kind = ?1")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Replaces local data with the snapshot, kind by kind, in one
    /// transaction.
    pub async fn import_snapshot(
        &self,
        snapshot: &Snapshot,
        options: &ImportOptions,
    ) -> DbResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut tx = self.pool.begin().await?;

        for kind in EntityKind::SNAPSHOT {
            if options.skip_kinds.contains(&kind) {
                debug!(kind = %kind, "Snapshot slice not authoritative, keeping local rows");
                continue;
            }

            let mut incoming = HashSet::new();
            for record in snapshot.records(kind) {
                let Some(id) = record.id() else {
                    warn!(kind = %kind, "Snapshot record without id skipped");
                    summary.skipped += 1;
                    continue;
                };
                incoming.insert(id.clone());

                if options.protected.contains(&EntityKey::new(kind, id.as_str())) {
                    summary.skipped += 1;
                    continue;
                }
                write(&mut *tx, kind, &id, record).await?;
                summary.upserted += 1;
            }

            let local_ids: Vec<String> =
                sqlx::query_scalar("SELECT id FROM records WHERE kind = ?1")
                    .bind(kind.as_str())
                    .fetch_all(&mut *tx)
                    .await?;

            for id in local_ids {
                if incoming.contains(&id)
                    || options.protected.contains(&EntityKey::new(kind, id.as_str()))
                {
                    continue;
                }
                sqlx::query("DELETE FROM records WHERE kind = ?1 AND id = ?2")
                    .bind(kind.as_str())
                    .bind(&id)
                    .execute(&mut *tx)
                    .await?;
                summary.removed += 1;
            }
        }

        tx.commit().await?;

        info!(
            upserted = summary.upserted,
            removed = summary.removed,
            skipped = summary.skipped,
            "Snapshot imported into local store"
        );
        Ok(summary)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn write(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    id: &str,
    record: &Record,
) -> DbResult<()> {
    let data = serde_json::to_string(record)?;
    sqlx::query(
        r#"
        INSERT INTO records (kind, id, data, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (kind, id) DO UPDATE SET
            data = excluded.data,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(kind.as_str())
    .bind(id)
    .bind(data)
    .bind(Utc::now().to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

async fn fetch_one(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    id: &str,
) -> DbResult<Option<Record>> {
    let data: Option<String> =
        sqlx::query_scalar("SELECT data FROM records WHERE kind = ?1 AND id = ?2")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(conn)
            .await?;
    data.as_deref().map(decode).transpose()
}

fn decode(data: &str) -> DbResult<Record> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    Record::from_value(value)
        .ok_or_else(|| DbError::InvalidRecord("stored record is not an object".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use serde_json::json;

    fn rec(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    async fn repo() -> RecordRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().records()
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let repo = repo().await;
        let created = repo
            .create(EntityKind::Product, rec(json!({"name": "Banana", "price": 0.5})))
            .await
            .unwrap();

        let id = created.id().unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let stored = repo.get(EntityKind::Product, &id).await.unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&json!("Banana")));
        assert_eq!(repo.count(EntityKind::Product).await.unwrap(), 1);
        assert_eq!(repo.count(EntityKind::Employee).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_merges_and_delete_removes() {
        let repo = repo().await;
        repo.upsert(EntityKind::Employee, &rec(json!({"id": "e-1", "name": "Ana", "role": "cashier"})))
            .await
            .unwrap();

        let updated = repo
            .update(EntityKind::Employee, "e-1", &rec(json!({"role": "manager"})))
            .await
            .unwrap();
        assert_eq!(updated.get("name"), Some(&json!("Ana")));
        assert_eq!(updated.get("role"), Some(&json!("manager")));

        assert!(repo.delete(EntityKind::Employee, "e-1").await.unwrap());
        assert!(!repo.delete(EntityKind::Employee, "e-1").await.unwrap());
        assert!(repo.get(EntityKind::Employee, "e-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_without_id_is_rejected() {
        let repo = repo().await;
        let err = repo
            .upsert(EntityKind::Product, &rec(json!({"name": "x"})))
            .await;
        assert!(matches!(err, Err(DbError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_import_snapshot_is_idempotent_replace() {
        let repo = repo().await;
        repo.upsert(EntityKind::Product, &rec(json!({"id": "stale", "name": "Old"})))
            .await
            .unwrap();

        let snapshot = Snapshot {
            products: vec![
                rec(json!({"id": "p-1", "name": "Banana"})),
                rec(json!({"id": "p-2", "name": "Apple"})),
            ],
            locations: vec![rec(json!({"id": 7, "name": "Front"}))],
            ..Default::default()
        };

        let first = repo
            .import_snapshot(&snapshot, &ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(first.upserted, 3);
        assert_eq!(first.removed, 1);

        let second = repo
            .import_snapshot(&snapshot, &ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(second.removed, 0);

        assert_eq!(repo.count(EntityKind::Product).await.unwrap(), 2);
        assert_eq!(repo.count(EntityKind::Location).await.unwrap(), 1);
        assert!(repo.get(EntityKind::Location, "7").await.unwrap().is_some());
        assert!(repo.get(EntityKind::Product, "stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_respects_protected_and_skipped_kinds() {
        let repo = repo().await;
        repo.upsert(EntityKind::Product, &rec(json!({"id": "p-1", "price": 0.75})))
            .await
            .unwrap();
        repo.upsert(EntityKind::Product, &rec(json!({"id": "p-local"})))
            .await
            .unwrap();
        repo.upsert(EntityKind::Employee, &rec(json!({"id": "e-1"})))
            .await
            .unwrap();

        let snapshot = Snapshot {
            products: vec![rec(json!({"id": "p-1", "price": 0.5}))],
            ..Default::default()
        };
        let mut options = ImportOptions::default();
        options.protected.insert(EntityKey::new(EntityKind::Product, "p-1"));
        options.protected.insert(EntityKey::new(EntityKind::Product, "p-local"));
        options.skip_kinds.push(EntityKind::Employee);

        let summary = repo.import_snapshot(&snapshot, &options).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.removed, 0);

        let p1 = repo.get(EntityKind::Product, "p-1").await.unwrap().unwrap();
        assert_eq!(p1.get("price"), Some(&json!(0.75)));
        assert!(repo.get(EntityKind::Product, "p-local").await.unwrap().is_some());
        assert_eq!(repo.count(EntityKind::Employee).await.unwrap(), 1);
    }
}

//! # Repository Module
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SyncManager                                                           │
//! │       │  db.records().import_snapshot(&snapshot, &options)             │
//! │       ▼                                                                 │
//! │  RecordRepository                                                      │
//! │  ├── create / update / delete      (per-entity mutators)               │
//! │  ├── upsert                        (realtime mirror)                   │
//! │  ├── get / list / count            (offline reads)                     │
//! │  └── import_snapshot               (idempotent reconciliation)         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  records (kind, id, data, updated_at)                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod records;

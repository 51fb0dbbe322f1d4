//! # kassa-db: Local Store for Kassa POS
//!
//! The embedded store each terminal keeps for offline operation. Records
//! of every entity kind live in one SQLite table keyed by `(kind, id)`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa POS Data Flow                              │
//! │                                                                         │
//! │  SyncManager (kassa-sync)                                              │
//! │    submit() ─── import_snapshot() ─── realtime mirror                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kassa-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repository   │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ (records.rs)  │    │  (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │ RecordRepo    │    │ 001_local... │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (platform data dir)/kassa.db                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kassa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("kassa.db")).await?;
//! let products = db.records().list(EntityKind::Product).await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::records::{ImportOptions, ImportSummary, RecordRepository};

//! # Database Pool Management
//!
//! Connection pool creation and configuration for the local store.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig::new(path) ← Configure pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SqlitePool (file: WAL journal, in-memory: one pinned connection)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.records() ← RecordRepository over a pool clone                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::records::RecordRepository;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Local store configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/kassa.db").max_connections(4);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Default: 5
    pub max_connections: u32,

    /// Default: 1
    pub min_connections: u32,

    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections
    /// open, which in-memory databases require.
    pub idle_timeout: Option<Duration>,

    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// In-memory database for tests. Each call yields an isolated store.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            // every connection would otherwise see its own empty database
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            run_migrations: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main local store handle providing repository access.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (and creates if missing) the local store, then runs
    /// migrations when enabled.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing local store"
        );

        let connect_options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            if let Some(parent) = config.database_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
                }
            }
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true)
        };

        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);
        if config.is_in_memory() {
            pool_options = pool_options.max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Local store pool created"
        );

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Raw pool access for queries not covered by a repository.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the record repository.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let banana = db.records().get(EntityKind::Product, "p-1").await?;
    /// ```
    pub fn records(&self) -> RecordRepository {
        RecordRepository::new(self.pool.clone())
    }

    pub async fn close(&self) {
        info!("Closing local store pool");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

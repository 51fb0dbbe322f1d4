//! # Database Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error / serde_json::Error                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError::LocalStore (kassa-sync)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Local store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Record not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored record body is not a JSON object.
    #[error("Invalid record data: {0}")]
    InvalidRecord(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("record", "unknown"),
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::InvalidRecord(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

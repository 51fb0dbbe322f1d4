//! # Error Types
//!
//! Domain-specific error types for kassa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kassa-core errors (this file)                                         │
//! │  ├── CoreError        - Malformed operations, unknown tags              │
//! │  └── ValidationError  - Input validation failures (addresses)           │
//! │                                                                         │
//! │  kassa-db errors                                                       │
//! │  └── DbError          - Local store failures                           │
//! │                                                                         │
//! │  kassa-sync errors                                                     │
//! │  └── SyncError        - Network, realtime, queue, settings             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → SyncReport            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain errors for records and queue operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A queue entry carries an operation tag outside the closed set.
    #[error("Unknown operation type: {0}")]
    UnknownOperation(String),

    /// An entity kind or topic prefix that this terminal does not know.
    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// An update/delete payload without the record key it targets.
    ///
    /// ## When This Occurs
    /// - `updateProduct` queued with a payload that has no `id`
    /// - A realtime `*:deleted` event without an `id`
    #[error("{operation} payload has no record id")]
    MissingRecordId { operation: String },

    /// A payload that is not a JSON object.
    #[error("{operation} payload must be a JSON object")]
    InvalidPayload { operation: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Invalid format (e.g., unparsable URL).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Address resolves to a link-local range, unreachable across machines.
    #[error("{address} is a link-local address and cannot be used as a server address")]
    LinkLocalAddress { address: String },

    /// URL scheme other than http/https.
    #[error("Unsupported scheme '{scheme}', expected http or https")]
    UnsupportedScheme { scheme: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

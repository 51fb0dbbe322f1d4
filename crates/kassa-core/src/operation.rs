//! # Queued Write Operations
//!
//! The closed set of writes that can be parked in the durable queue and
//! replayed against the shared store.
//!
//! ## Persisted Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sync_queue: [                                                          │
//! │    { "id": "<uuid>", "type": "createProduct",                          │
//! │      "payload": {"name": "Banana", "price": 0.5},                      │
//! │      "enqueuedAt": "2026-10-14T08:00:00Z" },                           │
//! │    ...                                                                  │
//! │  ]                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `type` tag is kept as a raw string on [`QueueEntry`] so an entry
//! written by a newer build still loads; it's rejected at replay time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::types::{ChangeKind, EntityKey, EntityKind, Record};

// =============================================================================
// Operation Type
// =============================================================================

/// Queueable write operation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    CreateInvoice,
    DeleteInvoice,
    CreateSupplierInvoice,
    CreateEmployee,
    UpdateEmployee,
    DeleteEmployee,
}

impl OperationType {
    pub const ALL: [OperationType; 9] = [
        OperationType::CreateProduct,
        OperationType::UpdateProduct,
        OperationType::DeleteProduct,
        OperationType::CreateInvoice,
        OperationType::DeleteInvoice,
        OperationType::CreateSupplierInvoice,
        OperationType::CreateEmployee,
        OperationType::UpdateEmployee,
        OperationType::DeleteEmployee,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationType::CreateProduct => "createProduct",
            OperationType::UpdateProduct => "updateProduct",
            OperationType::DeleteProduct => "deleteProduct",
            OperationType::CreateInvoice => "createInvoice",
            OperationType::DeleteInvoice => "deleteInvoice",
            OperationType::CreateSupplierInvoice => "createSupplierInvoice",
            OperationType::CreateEmployee => "createEmployee",
            OperationType::UpdateEmployee => "updateEmployee",
            OperationType::DeleteEmployee => "deleteEmployee",
        }
    }

    pub const fn entity_kind(&self) -> EntityKind {
        match self {
            OperationType::CreateProduct
            | OperationType::UpdateProduct
            | OperationType::DeleteProduct => EntityKind::Product,
            OperationType::CreateInvoice | OperationType::DeleteInvoice => EntityKind::Invoice,
            OperationType::CreateSupplierInvoice => EntityKind::SupplierInvoice,
            OperationType::CreateEmployee
            | OperationType::UpdateEmployee
            | OperationType::DeleteEmployee => EntityKind::Employee,
        }
    }

    pub const fn change(&self) -> ChangeKind {
        match self {
            OperationType::CreateProduct
            | OperationType::CreateInvoice
            | OperationType::CreateSupplierInvoice
            | OperationType::CreateEmployee => ChangeKind::Created,
            OperationType::UpdateProduct | OperationType::UpdateEmployee => ChangeKind::Updated,
            OperationType::DeleteProduct
            | OperationType::DeleteInvoice
            | OperationType::DeleteEmployee => ChangeKind::Deleted,
        }
    }

    /// Updates and deletes address an existing record.
    pub const fn requires_id(&self) -> bool {
        !matches!(self.change(), ChangeKind::Created)
    }

    /// The operation for `(kind, change)`, if that write is queueable.
    pub fn for_change(kind: EntityKind, change: ChangeKind) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.entity_kind() == kind && op.change() == change)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| CoreError::UnknownOperation(s.to_string()))
    }
}

// =============================================================================
// Operation
// =============================================================================

/// A validated write, ready to enqueue or send.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub op: OperationType,
    pub payload: Record,
}

impl Operation {
    /// Builds an operation, checking that updates and deletes carry an id.
    pub fn new(op: OperationType, payload: Record) -> CoreResult<Self> {
        if op.requires_id() && payload.id().is_none() {
            return Err(CoreError::MissingRecordId {
                operation: op.to_string(),
            });
        }
        Ok(Self { op, payload })
    }

    /// Builds an operation from a raw JSON payload.
    pub fn from_value(op: OperationType, payload: Value) -> CoreResult<Self> {
        let record = Record::from_value(payload).ok_or_else(|| CoreError::InvalidPayload {
            operation: op.to_string(),
        })?;
        Self::new(op, record)
    }

    pub fn entity_key(&self) -> Option<EntityKey> {
        self.payload
            .id()
            .map(|id| EntityKey::new(self.op.entity_kind(), id))
    }
}

// =============================================================================
// Queue Entry
// =============================================================================

/// One persisted entry of the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Entry id (UUID v4), distinct from the record id in the payload.
    pub id: String,

    /// Raw operation tag.
    #[serde(rename = "type")]
    pub op: String,

    pub payload: Value,

    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(operation: Operation) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            op: operation.op.as_str().to_string(),
            payload: operation.payload.into_value(),
            enqueued_at: Utc::now(),
        }
    }

    /// Parses the entry back into a typed operation.
    pub fn operation(&self) -> CoreResult<Operation> {
        let op: OperationType = self.op.parse()?;
        Operation::from_value(op, self.payload.clone())
    }

    /// Record targeted by this entry, when it names one.
    pub fn entity_key(&self) -> Option<EntityKey> {
        let op: OperationType = self.op.parse().ok()?;
        let id = Record::from_value(self.payload.clone())?.id()?;
        Some(EntityKey::new(op.entity_kind(), id))
    }
}

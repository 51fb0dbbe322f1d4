//! # Domain Types
//!
//! Core domain types shared by the local store and the sync layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   EntityKind    │   │     Record      │   │    Snapshot     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Product        │   │  JSON object    │   │  products       │       │
//! │  │  Location       │   │  id (str|num)   │   │  locations      │       │
//! │  │  Invoice        │   │  any fields     │   │  invoices       │       │
//! │  │  SupplierInvoice│   └─────────────────┘   │  supplierInv.   │       │
//! │  │  Employee       │                         │  employees      │       │
//! │  │  Absence        │                         └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ ConnectionMode  │   │   ServerRole    │   │   ChangeKind    │       │
//! │  │  Local          │   │  Server         │   │  Created        │       │
//! │  │  Network        │   │  Client         │   │  Updated        │       │
//! │  └─────────────────┘   └─────────────────┘   │  Deleted        │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Schemaless Records
//! The shared store owns the business schema. Terminals relay records
//! verbatim, so a [`Record`] is a JSON object and only its `id` is
//! interpreted here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

// =============================================================================
// Entity Kind
// =============================================================================

/// The domain entity kinds exchanged with the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Product,
    Location,
    Invoice,
    SupplierInvoice,
    Employee,
    Absence,
}

impl EntityKind {
    /// All kinds, in the order they are fetched and imported.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Product,
        EntityKind::Location,
        EntityKind::Invoice,
        EntityKind::SupplierInvoice,
        EntityKind::Employee,
        EntityKind::Absence,
    ];

    /// Kinds that make up a [`Snapshot`].
    pub const SNAPSHOT: [EntityKind; 5] = [
        EntityKind::Product,
        EntityKind::Location,
        EntityKind::Invoice,
        EntityKind::SupplierInvoice,
        EntityKind::Employee,
    ];

    /// REST resource segment on the shared store (`/api/<resource>`).
    pub const fn resource(&self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::Location => "locations",
            EntityKind::Invoice => "invoices",
            EntityKind::SupplierInvoice => "supplier-invoices",
            EntityKind::Employee => "employees",
            EntityKind::Absence => "absences",
        }
    }

    /// Prefix used in realtime topics (`<topic>:created`).
    pub const fn topic(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Location => "location",
            EntityKind::Invoice => "invoice",
            EntityKind::SupplierInvoice => "supplierInvoice",
            EntityKind::Employee => "employee",
            EntityKind::Absence => "absence",
        }
    }

    /// Stable storage tag used by the local store.
    pub const fn as_str(&self) -> &'static str {
        self.topic()
    }

    /// Looks up a kind by its realtime topic prefix.
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.topic() == topic)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.resource() == s)
            .ok_or_else(|| CoreError::UnknownEntityKind(s.to_string()))
    }
}

// =============================================================================
// Record
// =============================================================================

/// A single domain record as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Record key as a string. Numeric ids are rendered in decimal.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Sets the `id` field.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert("id".to_string(), Value::String(id.into()));
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a field value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Merges the fields of `patch` over this record.
    pub fn merge(&mut self, patch: &Record) {
        for (k, v) in &patch.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// =============================================================================
// Entity Key
// =============================================================================

/// Identifies one record across stores: `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Full pull of every aggregate resource from the shared store.
///
/// Built fresh on each (re)connection. Importing it must be idempotent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub products: Vec<Record>,
    pub locations: Vec<Record>,
    pub invoices: Vec<Record>,
    pub supplier_invoices: Vec<Record>,
    pub employees: Vec<Record>,
}

impl Snapshot {
    /// Records of one kind. `Absence` is not part of a snapshot.
    pub fn records(&self, kind: EntityKind) -> &[Record] {
        match kind {
            EntityKind::Product => &self.products,
            EntityKind::Location => &self.locations,
            EntityKind::Invoice => &self.invoices,
            EntityKind::SupplierInvoice => &self.supplier_invoices,
            EntityKind::Employee => &self.employees,
            EntityKind::Absence => &[],
        }
    }

    /// Replaces the records of one kind. Ignored for `Absence`.
    pub fn set_records(&mut self, kind: EntityKind, records: Vec<Record>) {
        match kind {
            EntityKind::Product => self.products = records,
            EntityKind::Location => self.locations = records,
            EntityKind::Invoice => self.invoices = records,
            EntityKind::SupplierInvoice => self.supplier_invoices = records,
            EntityKind::Employee => self.employees = records,
            EntityKind::Absence => {}
        }
    }

    /// Total records across all kinds.
    pub fn total(&self) -> usize {
        EntityKind::SNAPSHOT
            .iter()
            .map(|k| self.records(*k).len())
            .sum()
    }
}

// =============================================================================
// Connection Mode / Server Role
// =============================================================================

/// Where reads and writes are routed.
///
/// While `Local`, nothing is sent to the shared store directly; writes
/// go through the durable queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Local,
    Network,
}

impl ConnectionMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Local => "local",
            ConnectionMode::Network => "network",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ConnectionMode::Local),
            "network" => Ok(ConnectionMode::Network),
            other => Err(CoreError::Validation(
                crate::error::ValidationError::InvalidFormat {
                    field: "connection_mode".to_string(),
                    reason: format!("expected local or network, got {other}"),
                },
            )),
        }
    }
}

/// Whether this terminal hosts the shared store process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    Server,
    #[default]
    Client,
}

impl ServerRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServerRole::Server => "server",
            ServerRole::Client => "client",
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(ServerRole::Server),
            "client" => Ok(ServerRole::Client),
            other => Err(CoreError::Validation(
                crate::error::ValidationError::InvalidFormat {
                    field: "server_role".to_string(),
                    reason: format!("expected server or client, got {other}"),
                },
            )),
        }
    }
}

// =============================================================================
// Change Kind
// =============================================================================

/// The mutation a realtime event or queued write represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ChangeKind::Created),
            "updated" => Ok(ChangeKind::Updated),
            "deleted" => Ok(ChangeKind::Deleted),
            other => Err(CoreError::UnknownOperation(other.to_string())),
        }
    }
}

//! # kassa-core: Pure Domain Types for Kassa POS
//!
//! This crate holds the types that every other crate in the workspace agrees
//! on. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    kassa-sync                                   │   │
//! │  │   SharedStoreClient ─ RealtimeSubscriber ─ SyncQueue            │   │
//! │  │                 └────── SyncManager ──────┘                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kassa-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │ operation │  │ validation│                  │   │
//! │  │   │  Record   │  │ QueueEntry│  │ addresses │                  │   │
//! │  │   │  Snapshot │  │ OpType    │  │ link-local│                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kassa-db (Local Store)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Records, entity kinds, snapshot, connection mode, server role
//! - [`operation`] - Durable queue operation tags and entries
//! - [`validation`] - Server address validation (link-local rejection)
//! - [`error`] - Domain error types

pub mod error;
pub mod operation;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use operation::{Operation, OperationType, QueueEntry};
pub use types::*;

/// Default port the shared store listens on.
pub const DEFAULT_SERVER_PORT: u16 = 3001;

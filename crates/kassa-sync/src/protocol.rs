//! # Realtime Protocol
//!
//! Frames pushed by the shared store over the realtime channel, and the
//! typed events they become on this side.
//!
//! ## Wire Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  { "event": "product:created",          "data": { "id": "p-1", .. } }  │
//! │  { "event": "supplierInvoice:deleted",  "data": { "id": "s-9" } }      │
//! │  { "event": "product:quantity-updated", "data": { "id": "p-1",         │
//! │                                                   "quantity": 12 } }   │
//! │                                                                         │
//! │  topic = <entity topic> ":" ( created | updated | deleted )            │
//! │        | "product:quantity-updated"                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unknown topics decode to `None` and are dropped by the subscriber.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncResult;
use kassa_core::{ChangeKind, EntityKind};

/// Topic the shared store publishes stock changes under.
pub const QUANTITY_UPDATED_TOPIC: &str = "product:quantity-updated";

// =============================================================================
// Frame
// =============================================================================

/// One realtime frame as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,

    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Frame for an entity change.
    pub fn entity(kind: EntityKind, change: ChangeKind, data: Value) -> Self {
        Self {
            event: format!("{}:{}", kind.topic(), change),
            data,
        }
    }
}

// =============================================================================
// Realtime Event
// =============================================================================

/// Everything the subscriber delivers to handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Transport connected.
    Connected,

    /// Transport disconnected.
    Disconnected,

    /// Pre-connect probe failed or reconnect budget exhausted.
    ConnectionFailed { reason: String },

    /// Remote entity change, payload relayed verbatim.
    Entity {
        kind: EntityKind,
        change: ChangeKind,
        payload: Value,
    },

    /// Remote stock change, payload relayed verbatim.
    QuantityUpdated { payload: Value },
}

impl RealtimeEvent {
    /// Topic-style name, for logging.
    pub fn name(&self) -> String {
        match self {
            RealtimeEvent::Connected => "connected".to_string(),
            RealtimeEvent::Disconnected => "disconnected".to_string(),
            RealtimeEvent::ConnectionFailed { .. } => "connection-failed".to_string(),
            RealtimeEvent::Entity { kind, change, .. } => format!("{}:{}", kind.topic(), change),
            RealtimeEvent::QuantityUpdated { .. } => QUANTITY_UPDATED_TOPIC.to_string(),
        }
    }

    /// True for the three transport lifecycle signals.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            RealtimeEvent::Connected
                | RealtimeEvent::Disconnected
                | RealtimeEvent::ConnectionFailed { .. }
        )
    }
}

/// Decodes a text frame. `Ok(None)` for well-formed frames on topics this
/// terminal does not relay.
pub fn decode_frame(text: &str) -> SyncResult<Option<RealtimeEvent>> {
    let frame = EventFrame::from_json(text)?;
    Ok(event_from_frame(frame))
}

fn event_from_frame(frame: EventFrame) -> Option<RealtimeEvent> {
    if frame.event == QUANTITY_UPDATED_TOPIC {
        return Some(RealtimeEvent::QuantityUpdated {
            payload: frame.data,
        });
    }

    let (topic, change) = frame.event.split_once(':')?;
    let kind = EntityKind::from_topic(topic)?;
    let change = change.parse::<ChangeKind>().ok()?;
    Some(RealtimeEvent::Entity {
        kind,
        change,
        payload: frame.data,
    })
}

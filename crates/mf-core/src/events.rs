//! Queue event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late subscribers (a UI attaching
//! mid-run, a test asserting on ordering) can catch up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::ItemId;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Queue membership ----------------------------------------------------
    ItemAdded {
        item_id: ItemId,
        name: String,
    },
    ItemRejected {
        name: String,
        mime: String,
    },
    ItemUpdated {
        item_id: ItemId,
    },
    ItemRemoved {
        item_id: ItemId,
    },
    QueueReset {
        removed: usize,
    },

    // -- Conversion ----------------------------------------------------------
    ConversionStarted {
        item_id: ItemId,
    },
    ConversionProgress {
        item_id: ItemId,
        progress: u8,
    },
    ConversionCompleted {
        item_id: ItemId,
        output_size: u64,
    },
    ConversionFailed {
        item_id: ItemId,
        error: String,
        /// Decoder/encoder diagnostic behind a short raster error message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    // -- Engine --------------------------------------------------------------
    EngineLoaded,
}

impl EventPayload {
    /// The item this event concerns, if any.
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::ItemAdded { item_id, .. }
            | Self::ItemUpdated { item_id }
            | Self::ItemRemoved { item_id }
            | Self::ConversionStarted { item_id }
            | Self::ConversionProgress { item_id, .. }
            | Self::ConversionCompleted { item_id, .. }
            | Self::ConversionFailed { item_id, .. } => Some(*item_id),
            Self::ItemRejected { .. } | Self::QueueReset { .. } | Self::EngineLoaded => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        // Store in ring buffer regardless of subscriber count.
        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // Ignore send errors (no subscribers).
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

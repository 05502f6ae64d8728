//! Presence events emitted by the presence service.
//!
//! Events are ephemeral: they are created at the moment of a state
//! transition, fanned out to current subscribers, and discarded.

pub mod presence;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use presence::{PresenceEventKind, PresenceEventPayload};

/// Wrapper for presence event payloads with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    /// Unique event ID.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub payload: PresenceEventPayload,
}

impl PresenceEvent {
    /// Create a new event stamped with the given time.
    pub fn at(payload: PresenceEventPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            payload,
        }
    }

    /// Create a new event stamped with the current wall clock.
    pub fn now(payload: PresenceEventPayload) -> Self {
        Self::at(payload, Utc::now())
    }

    /// The discriminant of the payload.
    pub fn kind(&self) -> PresenceEventKind {
        self.payload.kind()
    }
}

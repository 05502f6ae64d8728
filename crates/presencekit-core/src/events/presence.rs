//! Presence event payloads.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};
use crate::types::{IdentityId, Location, PresenceStatus, SessionId};

/// Payload of a presence event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEventPayload {
    /// The current device's status was written.
    StatusChange {
        /// The new status.
        status: PresenceStatus,
        /// This device's session.
        session_id: SessionId,
        /// Location included with the write, if any.
        location: Option<Location>,
    },
    /// A backend or liveness failure was recorded.
    Error {
        /// The error category.
        kind: ErrorKind,
        /// Human-readable message.
        message: String,
    },
    /// Tracking started for an identity.
    Init {
        /// The tracked identity.
        user_id: IdentityId,
    },
    /// The service was disposed.
    Disconnect,
    /// A periodic refresh captured a new location.
    LocationUpdate {
        /// The captured location.
        location: Location,
    },
}

impl PresenceEventPayload {
    /// Build an error payload from an application error.
    pub fn error(err: &AppError) -> Self {
        Self::Error {
            kind: err.kind,
            message: err.message.clone(),
        }
    }

    /// The discriminant of this payload.
    pub fn kind(&self) -> PresenceEventKind {
        match self {
            Self::StatusChange { .. } => PresenceEventKind::StatusChange,
            Self::Error { .. } => PresenceEventKind::Error,
            Self::Init { .. } => PresenceEventKind::Init,
            Self::Disconnect => PresenceEventKind::Disconnect,
            Self::LocationUpdate { .. } => PresenceEventKind::LocationUpdate,
        }
    }
}

/// Presence event type without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEventKind {
    /// See [`PresenceEventPayload::StatusChange`].
    StatusChange,
    /// See [`PresenceEventPayload::Error`].
    Error,
    /// See [`PresenceEventPayload::Init`].
    Init,
    /// See [`PresenceEventPayload::Disconnect`].
    Disconnect,
    /// See [`PresenceEventPayload::LocationUpdate`].
    LocationUpdate,
}

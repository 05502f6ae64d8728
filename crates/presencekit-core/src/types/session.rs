//! Multi-device session records and the per-identity session list.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::{DeviceFingerprint, IdentityId, SessionId};
use crate::result::AppResult;

/// Presence status of one device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Connected and visible.
    Online,
    /// Connected but the host page is hidden.
    Away,
    /// Not connected.
    Offline,
}

impl PresenceStatus {
    /// Converts to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved device location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// When the coordinates were captured.
    pub last_updated: DateTime<Utc>,
}

/// One device's presence record for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Composite `{identity}_{fingerprint}` key.
    #[serde(rename = "uid")]
    pub session_id: SessionId,
    /// Owning identity.
    #[serde(rename = "userId")]
    pub identity_id: IdentityId,
    /// Device fingerprint.
    pub device_id: DeviceFingerprint,
    /// Current status.
    pub status: PresenceStatus,
    /// When the session first appeared.
    pub created_at: DateTime<Utc>,
    /// Last status write for the session.
    pub last_seen: DateTime<Utc>,
    /// Location, present only when capture is enabled and permitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// The persisted list of sessions for one identity.
///
/// Stored as `{"sessionDatas": [...]}` at `sessions/{identity}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionList {
    /// All known sessions, in insertion order.
    #[serde(rename = "sessionDatas", default)]
    pub sessions: Vec<Session>,
}

impl SessionList {
    /// Backend path holding an identity's session list.
    pub fn path(identity: &IdentityId) -> String {
        format!("sessions/{identity}")
    }

    /// Decode a backend value; an absent value is an empty list.
    pub fn from_value(value: Option<Value>) -> AppResult<Self> {
        match value {
            Some(Value::Null) | None => Ok(Self::default()),
            Some(v) => Ok(serde_json::from_value(v)?),
        }
    }

    /// Encode for a whole-value backend write.
    pub fn to_value(&self) -> AppResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Look up a session by id.
    pub fn find(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.session_id == session_id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the list holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Apply a status write for `device`.
    ///
    /// Updates the matching entry in place or appends a fresh one, so the
    /// list never holds two entries for the same device. The location is
    /// only replaced when one was resolved.
    pub fn upsert(
        &mut self,
        identity: &IdentityId,
        device: &DeviceFingerprint,
        status: PresenceStatus,
        location: Option<Location>,
        now: DateTime<Utc>,
    ) -> SessionId {
        let session_id = SessionId::for_device(identity, device);

        match self
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
        {
            Some(existing) => {
                existing.status = status;
                existing.last_seen = now.max(existing.created_at);
                if location.is_some() {
                    existing.location = location;
                }
            }
            None => self.sessions.push(Session {
                session_id: session_id.clone(),
                identity_id: identity.clone(),
                device_id: device.clone(),
                status,
                created_at: now,
                last_seen: now,
                location,
            }),
        }

        session_id
    }

    /// Drop every session last seen at or before `now - ttl`.
    ///
    /// Returns the number of sessions removed. A `None` TTL keeps everything,
    /// as does a TTL reaching past the earliest representable instant.
    pub fn prune(&mut self, now: DateTime<Utc>, ttl: Option<Duration>) -> usize {
        let Some(cutoff) = ttl.and_then(|ttl| now.checked_sub_signed(ttl)) else {
            return 0;
        };
        let before = self.sessions.len();
        self.sessions.retain(|s| s.last_seen > cutoff);
        before - self.sessions.len()
    }

    /// Copy of the list with every session forced offline and stamped `now`.
    pub fn offline_snapshot(&self, now: DateTime<Utc>) -> Self {
        let sessions = self
            .sessions
            .iter()
            .cloned()
            .map(|mut s| {
                s.status = PresenceStatus::Offline;
                s.last_seen = now.max(s.created_at);
                s
            })
            .collect();
        Self { sessions }
    }
}

//! Local snapshot of the current device's presence.

use chrono::{DateTime, Utc};

use presencekit_core::error::AppError;
use presencekit_core::types::{PresenceStatus, Session, SessionId, SessionList};

/// In-memory view of the identity's sessions as last seen by this device.
///
/// Only mutated after a backend round-trip resolves or a push update
/// arrives, so a reader never sees a half-applied write.
#[derive(Debug, Clone)]
pub struct SessionStore {
    /// Every session of the identity.
    pub sessions: Vec<Session>,
    /// This device's session.
    pub current_session: Option<Session>,
    /// This device's status.
    pub status: PresenceStatus,
    /// Whether initialization is in progress.
    pub loading: bool,
    /// Most recent recorded failure.
    pub error: Option<AppError>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            current_session: None,
            status: PresenceStatus::Offline,
            loading: true,
            error: None,
        }
    }
}

impl SessionStore {
    /// Adopt the result of a successful presence write.
    pub fn apply_write(&mut self, list: SessionList, session_id: &SessionId, status: PresenceStatus) {
        self.current_session = list.find(session_id).cloned();
        self.sessions = list.sessions;
        self.status = status;
    }

    /// Adopt a push update of the persisted list. The local status is kept;
    /// only the sessions and this device's record are refreshed.
    pub fn apply_remote(&mut self, list: SessionList, session_id: &SessionId) {
        self.current_session = list.find(session_id).cloned();
        self.sessions = list.sessions;
    }

    /// Change the status locally without a backend write.
    pub fn apply_local_status(&mut self, status: PresenceStatus, now: DateTime<Utc>) {
        self.status = status;
        if let Some(current) = self.current_session.as_mut() {
            current.status = status;
            current.last_seen = now.max(current.created_at);
            let id = current.session_id.clone();
            if let Some(entry) = self.sessions.iter_mut().find(|s| s.session_id == id) {
                *entry = current.clone();
            }
        }
    }

    /// Record a failure.
    pub fn record_error(&mut self, err: AppError) {
        self.error = Some(err);
    }

    /// Current sessions as a persistable list.
    pub fn session_list(&self) -> SessionList {
        SessionList {
            sessions: self.sessions.clone(),
        }
    }

    /// Reset to the disposed state.
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.current_session = None;
        self.status = PresenceStatus::Offline;
        self.loading = false;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presencekit_core::types::{DeviceFingerprint, IdentityId};

    fn list_with(devices: &[&str]) -> SessionList {
        let mut list = SessionList::default();
        for d in devices {
            list.upsert(
                &IdentityId::new("U1"),
                &DeviceFingerprint::new(d),
                PresenceStatus::Online,
                None,
                DateTime::from_timestamp_millis(0).unwrap(),
            );
        }
        list
    }

    #[test]
    fn test_apply_write_sets_current_session() {
        let mut store = SessionStore::default();
        store.apply_write(list_with(&["D1", "D2"]), &"U1_D2".into(), PresenceStatus::Online);

        assert_eq!(store.sessions.len(), 2);
        assert_eq!(
            store.current_session.as_ref().unwrap().session_id.as_str(),
            "U1_D2"
        );
        assert_eq!(store.status, PresenceStatus::Online);
    }

    #[test]
    fn test_apply_remote_keeps_local_status() {
        let mut store = SessionStore::default();
        store.apply_write(list_with(&["D1"]), &"U1_D1".into(), PresenceStatus::Away);
        store.apply_remote(list_with(&["D2"]), &"U1_D1".into());

        assert_eq!(store.status, PresenceStatus::Away);
        assert!(store.current_session.is_none());
        assert_eq!(store.sessions.len(), 1);
    }

    #[test]
    fn test_apply_local_status_updates_both_views() {
        let mut store = SessionStore::default();
        store.apply_write(list_with(&["D1"]), &"U1_D1".into(), PresenceStatus::Online);
        store.apply_local_status(
            PresenceStatus::Offline,
            DateTime::from_timestamp_millis(10).unwrap(),
        );

        assert_eq!(store.status, PresenceStatus::Offline);
        assert_eq!(store.current_session.as_ref().unwrap().status, PresenceStatus::Offline);
        assert_eq!(store.sessions[0].status, PresenceStatus::Offline);
    }

    #[test]
    fn test_clear() {
        let mut store = SessionStore::default();
        store.apply_write(list_with(&["D1"]), &"U1_D1".into(), PresenceStatus::Online);
        store.record_error(AppError::backend("x"));
        store.clear();

        assert!(store.sessions.is_empty());
        assert!(store.current_session.is_none());
        assert_eq!(store.status, PresenceStatus::Offline);
        assert!(store.error.is_none());
        assert!(!store.loading);
    }
}

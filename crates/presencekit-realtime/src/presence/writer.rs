//! Presence writes: read-modify-write of the identity's session list.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use presencekit_core::error::AppError;
use presencekit_core::events::{PresenceEvent, PresenceEventPayload};
use presencekit_core::result::AppResult;
use presencekit_core::traits::backend::RealtimeBackend;
use presencekit_core::traits::clock::Clock;
use presencekit_core::types::{
    DeviceFingerprint, IdentityId, Location, PresenceStatus, Session, SessionId, SessionList,
};

use crate::bus::EventBus;
use crate::location::LocationCapture;

use super::store::SessionStore;

/// Merges this device's status into the persisted session list.
///
/// Writes are not serialized: two concurrent writes both read the list,
/// and whichever lands last wins. Other devices race the same way.
#[derive(Debug)]
pub struct PresenceWriter {
    backend: Arc<dyn RealtimeBackend>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    store: Arc<RwLock<SessionStore>>,
    identity: Arc<RwLock<Option<IdentityId>>>,
    device: DeviceFingerprint,
    session_ttl: Option<chrono::Duration>,
    location: Arc<LocationCapture>,
    shutdown: CancellationToken,
}

impl PresenceWriter {
    /// Create a writer. Writes are refused once `shutdown` is cancelled.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn RealtimeBackend>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
        store: Arc<RwLock<SessionStore>>,
        identity: Arc<RwLock<Option<IdentityId>>>,
        device: DeviceFingerprint,
        session_ttl: Option<chrono::Duration>,
        location: Arc<LocationCapture>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            backend,
            clock,
            bus,
            store,
            identity,
            device,
            session_ttl,
            location,
            shutdown,
        }
    }

    /// This device's fingerprint.
    pub fn device(&self) -> &DeviceFingerprint {
        &self.device
    }

    /// The location capture consulted on every write.
    pub fn location(&self) -> &Arc<LocationCapture> {
        &self.location
    }

    /// The local snapshot this writer reconciles.
    pub fn store(&self) -> &Arc<RwLock<SessionStore>> {
        &self.store
    }

    /// This device's session id for the bound identity, if any.
    pub async fn session_id(&self) -> Option<SessionId> {
        self.identity
            .read()
            .await
            .as_ref()
            .map(|identity| SessionId::for_device(identity, &self.device))
    }

    /// Write `status` for this device, resolving the location first.
    ///
    /// On failure the error is recorded locally, an `error` event is
    /// emitted, and the error is returned. No retry is attempted. After
    /// disposal the write is refused silently.
    pub async fn set_presence(&self, status: PresenceStatus) -> AppResult<Session> {
        let location = self.location.capture().await;
        self.write_status(status, location).await
    }

    /// Write `status` with an already-resolved location.
    pub async fn write_status(
        &self,
        status: PresenceStatus,
        location: Option<Location>,
    ) -> AppResult<Session> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::invalid_state("presence service has been disposed"));
        }

        match self.try_write(status, location).await {
            Ok(session) => Ok(session),
            Err(err) => {
                warn!(error = %err, %status, "Presence write failed");
                self.store.write().await.record_error(err.clone());
                self.emit(PresenceEventPayload::error(&err));
                Err(err)
            }
        }
    }

    /// Apply `status` to the local snapshot only and announce it.
    ///
    /// Used when the backend cannot be reached, so the device still reports
    /// the status it believes it has.
    pub async fn apply_local_status(&self, status: PresenceStatus) {
        let now = self.clock.now();
        self.store.write().await.apply_local_status(status, now);

        if let Some(session_id) = self.session_id().await {
            self.emit(PresenceEventPayload::StatusChange {
                status,
                session_id,
                location: None,
            });
        }
    }

    /// Emit an event stamped by this writer's clock.
    pub fn emit(&self, payload: PresenceEventPayload) {
        self.bus.emit(PresenceEvent::at(payload, self.clock.now()));
    }

    async fn try_write(
        &self,
        status: PresenceStatus,
        location: Option<Location>,
    ) -> AppResult<Session> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::invalid_state("presence service has been disposed"));
        }

        let identity = self
            .identity
            .read()
            .await
            .clone()
            .ok_or_else(AppError::no_authenticated_user)?;

        let path = SessionList::path(&identity);
        let mut list = SessionList::from_value(self.backend.read(&path).await?)?;

        let now = self.clock.now();
        let session_id = list.upsert(&identity, &self.device, status, location, now);
        let pruned = list.prune(now, self.session_ttl);

        self.backend.write(&path, list.to_value()?).await?;

        debug!(
            session_id = %session_id,
            %status,
            sessions = list.len(),
            pruned,
            "Presence written"
        );

        let session = list
            .find(&session_id)
            .cloned()
            .ok_or_else(|| AppError::internal("written session missing from list"))?;

        if self.shutdown.is_cancelled() {
            return Ok(session);
        }

        self.store
            .write()
            .await
            .apply_write(list, &session_id, status);

        self.emit(PresenceEventPayload::StatusChange {
            status,
            session_id,
            location,
        });

        Ok(session)
    }
}

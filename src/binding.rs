//! Ties presence tracking to the signed-in identity.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use presencekit_auth::AuthUser;
use presencekit_core::config::presence::PresenceConfig;
use presencekit_core::result::AppResult;
use presencekit_core::traits::backend::RealtimeBackend;
use presencekit_core::types::{DeviceFingerprint, IdentityId};
use presencekit_realtime::PresenceService;

/// Owns the presence service of one device for whoever is signed in.
///
/// Sign-in builds and initializes a fresh service; sign-out or a switch to
/// another identity disposes the current one first.
#[derive(Debug)]
pub struct PresenceBinding {
    backend: Arc<dyn RealtimeBackend>,
    device: DeviceFingerprint,
    config: PresenceConfig,
    current: Mutex<Option<(IdentityId, Arc<PresenceService>)>>,
}

impl PresenceBinding {
    pub fn new(
        backend: Arc<dyn RealtimeBackend>,
        device: DeviceFingerprint,
        config: PresenceConfig,
    ) -> Self {
        Self {
            backend,
            device,
            config,
            current: Mutex::new(None),
        }
    }

    /// The service tracking the signed-in identity, if any.
    pub async fn service(&self) -> Option<Arc<PresenceService>> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|(_, service)| Arc::clone(service))
    }

    /// Bring tracking in line with `user`.
    pub async fn apply(&self, user: Option<&AuthUser>) -> AppResult<()> {
        let mut current = self.current.lock().await;

        if let (Some((tracked, _)), Some(user)) = (current.as_ref(), user) {
            if *tracked == user.uid {
                debug!(uid = %user.uid, "Presence already bound");
                return Ok(());
            }
        }

        if let Some((identity, service)) = current.take() {
            info!(%identity, device = %self.device, "Releasing presence");
            service.dispose().await;
        }

        let Some(user) = user else {
            return Ok(());
        };

        let service = PresenceService::builder(Arc::clone(&self.backend), self.device.clone())
            .config(self.config.clone())
            .build()?;

        let device = self.device.clone();
        // Lives as long as the service.
        let _ = service.subscribe(move |event| {
            debug!(device = %device, kind = ?event.kind(), "Presence event");
        });

        service.initialize(user.uid.clone()).await?;
        *current = Some((user.uid.clone(), Arc::new(service)));
        Ok(())
    }

    /// Follow `users` until it closes or `shutdown` flips, then release.
    pub fn spawn(
        self: Arc<Self>,
        mut users: watch::Receiver<Option<AuthUser>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = users.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let user = users.borrow_and_update().clone();
                        if let Err(e) = self.apply(user.as_ref()).await {
                            warn!(error = %e, device = %self.device, "Failed to bind presence");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            if let Err(e) = self.apply(None).await {
                warn!(error = %e, "Failed to release presence");
            }
        })
    }
}

//! Server-side disconnect fallback registration.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use presencekit_core::result::AppResult;
use presencekit_core::traits::backend::RealtimeBackend;
use presencekit_core::traits::clock::Clock;
use presencekit_core::types::{IdentityId, SessionList};

use super::store::SessionStore;

/// Arms the "mark everything offline" write the backend commits if this
/// client vanishes without cleanup.
///
/// The armed value is a snapshot; a presence write that lands between
/// arming and the disconnect is not reflected in it. Re-arm on every
/// reconnect.
#[derive(Debug)]
pub struct DisconnectRegistrar {
    backend: Arc<dyn RealtimeBackend>,
    clock: Arc<dyn Clock>,
    store: Arc<RwLock<SessionStore>>,
}

impl DisconnectRegistrar {
    /// Create a registrar reading sessions from `store`.
    pub fn new(
        backend: Arc<dyn RealtimeBackend>,
        clock: Arc<dyn Clock>,
        store: Arc<RwLock<SessionStore>>,
    ) -> Self {
        Self {
            backend,
            clock,
            store,
        }
    }

    /// Register the fallback for `identity` and return the armed list.
    pub async fn arm(&self, identity: &IdentityId) -> AppResult<SessionList> {
        let fallback = self
            .store
            .read()
            .await
            .session_list()
            .offline_snapshot(self.clock.now());

        let path = SessionList::path(identity);
        self.backend
            .register_fallback(&path, fallback.to_value()?)
            .await?;

        debug!(path = %path, sessions = fallback.len(), "Disconnect fallback armed");
        Ok(fallback)
    }
}

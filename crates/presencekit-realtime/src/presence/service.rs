//! Presence service: composition and lifecycle of the presence components.

use std::sync::{Arc, Mutex};

use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use presencekit_core::config::presence::PresenceConfig;
use presencekit_core::error::AppError;
use presencekit_core::events::{PresenceEvent, PresenceEventPayload};
use presencekit_core::result::AppResult;
use presencekit_core::traits::backend::{CONNECTED_PATH, RealtimeBackend};
use presencekit_core::traits::clock::{Clock, SystemClock};
use presencekit_core::traits::location::{CustomLocationFn, DeviceLocator};
use presencekit_core::types::{
    DeviceFingerprint, IdentityId, PresenceStatus, Session, SessionId, SessionList,
};

use crate::bus::{EventBus, ListenerHandle};
use crate::location::{LocationCapture, LocationWatcher};

use super::lifecycle::{InitDecision, Lifecycle, LifecycleState};
use super::observer::{ConnectivityObserver, VisibilityObserver, VisibilityState, spawn_session_sync};
use super::registrar::DisconnectRegistrar;
use super::store::SessionStore;
use super::writer::PresenceWriter;

/// Builder for [`PresenceService`].
pub struct PresenceServiceBuilder {
    backend: Arc<dyn RealtimeBackend>,
    device: DeviceFingerprint,
    config: PresenceConfig,
    clock: Arc<dyn Clock>,
    device_locator: Option<Arc<dyn DeviceLocator>>,
    custom_location: Option<CustomLocationFn>,
    http_client: Option<reqwest::Client>,
    event_buffer: usize,
}

impl PresenceServiceBuilder {
    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: PresenceConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `clock` for session timestamps and pruning.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the host's device positioning.
    pub fn device_locator(mut self, locator: Arc<dyn DeviceLocator>) -> Self {
        self.device_locator = Some(locator);
        self
    }

    /// Attach a caller-supplied location resolver.
    pub fn custom_location(mut self, resolver: CustomLocationFn) -> Self {
        self.custom_location = Some(resolver);
        self
    }

    /// HTTP client for the network location strategy.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Buffer size of the broadcast event view.
    pub fn event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size;
        self
    }

    /// Validate the configuration and assemble the service.
    pub fn build(self) -> AppResult<PresenceService> {
        self.config.validate()?;

        let mut capture = LocationCapture::new(self.config.geolocation.clone(), Arc::clone(&self.clock));
        if let Some(locator) = self.device_locator {
            capture = capture.with_device_locator(locator);
        }
        if let Some(resolver) = self.custom_location {
            capture = capture.with_custom_resolver(resolver);
        }
        if let Some(client) = self.http_client {
            capture = capture.with_http_client(client);
        }
        let location = Arc::new(capture);

        let bus = EventBus::new(self.event_buffer);
        let store = Arc::new(RwLock::new(SessionStore::default()));
        let identity = Arc::new(RwLock::new(None));
        let shutdown = CancellationToken::new();

        let writer = Arc::new(PresenceWriter::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.clock),
            bus.clone(),
            Arc::clone(&store),
            Arc::clone(&identity),
            self.device,
            self.config.session_ttl(),
            Arc::clone(&location),
            shutdown.clone(),
        ));
        let registrar = Arc::new(DisconnectRegistrar::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.clock),
            Arc::clone(&store),
        ));

        Ok(PresenceService {
            config: self.config,
            backend: self.backend,
            lifecycle: Arc::new(Lifecycle::default()),
            bus,
            store,
            identity,
            writer,
            registrar,
            location,
            watcher: LocationWatcher::new(),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Tracks this device's presence for one identity.
///
/// Construct one instance per signed-in identity and hold it at the
/// composition root. After [`dispose`](Self::dispose) the instance is inert;
/// build a new one to resume tracking.
#[derive(Debug)]
pub struct PresenceService {
    config: PresenceConfig,
    backend: Arc<dyn RealtimeBackend>,
    lifecycle: Arc<Lifecycle>,
    bus: EventBus,
    store: Arc<RwLock<SessionStore>>,
    identity: Arc<RwLock<Option<IdentityId>>>,
    writer: Arc<PresenceWriter>,
    registrar: Arc<DisconnectRegistrar>,
    location: Arc<LocationCapture>,
    watcher: LocationWatcher,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PresenceService {
    /// Start building a service for `device` on `backend`.
    pub fn builder(backend: Arc<dyn RealtimeBackend>, device: DeviceFingerprint) -> PresenceServiceBuilder {
        PresenceServiceBuilder {
            backend,
            device,
            config: PresenceConfig::default(),
            clock: Arc::new(SystemClock),
            device_locator: None,
            custom_location: None,
            http_client: None,
            event_buffer: 256,
        }
    }

    /// Start tracking `identity`.
    ///
    /// Requests location consent when required, subscribes to the liveness
    /// signal and the identity's session list, and emits `init`. Calling it
    /// again while initializing or tracking only logs a warning. Fails with
    /// `InvalidState` after disposal.
    pub async fn initialize(&self, identity: IdentityId) -> AppResult<()> {
        match self.lifecycle.begin_init() {
            InitDecision::Proceed => {}
            InitDecision::AlreadyStarted => {
                warn!(identity = %identity, "Presence service is already initialized");
                return Ok(());
            }
            InitDecision::Disposed => {
                return Err(AppError::invalid_state("presence service has been disposed"));
            }
        }

        info!(identity = %identity, device = %self.writer.device(), "Initializing presence tracking");
        self.store.write().await.loading = true;
        *self.identity.write().await = Some(identity.clone());

        let result = self.start_tracking(&identity).await;
        self.store.write().await.loading = false;

        if let Err(err) = result {
            warn!(error = %err, "Presence initialization failed");
            self.lifecycle.abort_init();
            *self.identity.write().await = None;
            self.store.write().await.record_error(err.clone());
            self.writer.emit(PresenceEventPayload::error(&err));
            return Err(err);
        }

        if !self.lifecycle.finish_init() {
            return Err(AppError::invalid_state(
                "presence service was disposed during initialization",
            ));
        }

        if self.location.is_permitted() {
            self.start_location_refresh();
        }

        self.writer.emit(PresenceEventPayload::Init { user_id: identity });
        Ok(())
    }

    async fn start_tracking(&self, identity: &IdentityId) -> AppResult<()> {
        let geo = self.location.config();
        if geo.enabled && geo.require_consent {
            self.location.request_consent().await;
        }

        let liveness = self.backend.watch(CONNECTED_PATH).await?;
        let sessions = self.backend.watch(&SessionList::path(identity)).await?;

        let token = self.shutdown.child_token();
        let observer = ConnectivityObserver::new(
            Arc::clone(&self.writer),
            Arc::clone(&self.registrar),
            identity.clone(),
        );
        let session_id = SessionId::for_device(identity, self.writer.device());

        let mut tasks = self.lock_tasks();
        tasks.push(observer.spawn(liveness, token.clone()));
        tasks.push(spawn_session_sync(
            Arc::clone(&self.writer),
            session_id,
            sessions,
            token,
        ));
        Ok(())
    }

    /// Write `status` for this device.
    ///
    /// Fails with `NoAuthenticatedUser` before initialization. Backend
    /// failures are recorded, emitted as `error` events, and returned.
    pub async fn set_presence(&self, status: PresenceStatus) -> AppResult<Session> {
        self.writer.set_presence(status).await
    }

    /// Apply a page visibility change. Ignored until tracking has started;
    /// write failures are absorbed.
    pub async fn handle_visibility(&self, visibility: VisibilityState) -> Option<PresenceStatus> {
        self.visibility_observer().on_change(visibility).await
    }

    /// Follow a host visibility signal until disposal.
    pub fn watch_visibility(&self, signal: watch::Receiver<VisibilityState>) {
        let task = self
            .visibility_observer()
            .spawn(signal, self.shutdown.child_token());
        self.lock_tasks().push(task);
    }

    fn visibility_observer(&self) -> VisibilityObserver {
        VisibilityObserver::new(Arc::clone(&self.lifecycle), Arc::clone(&self.writer))
    }

    /// Ask for location permission. Returns whether it was granted.
    pub async fn request_location_consent(&self) -> bool {
        self.location.request_consent().await
    }

    /// Start the periodic location refresh if capture is permitted.
    pub fn start_location_refresh(&self) -> bool {
        if self.shutdown.is_cancelled() || !self.location.is_permitted() {
            return false;
        }
        self.watcher.start(
            Arc::clone(&self.writer),
            self.config.update_interval(),
            &self.shutdown,
        );
        true
    }

    /// Stop the periodic location refresh.
    pub fn stop_location_refresh(&self) {
        self.watcher.stop();
    }

    /// Whether the periodic location refresh is active.
    pub fn is_location_refresh_running(&self) -> bool {
        self.watcher.is_running()
    }

    /// Register an event callback.
    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    /// Receive events asynchronously.
    pub fn events(&self) -> broadcast::Receiver<PresenceEvent> {
        self.bus.subscribe_channel()
    }

    /// Tear everything down.
    ///
    /// Cancels observers and the location refresh, clears the snapshot, and
    /// emits a single `disconnect` event. Safe to call at any time; only the
    /// first call has an effect.
    pub async fn dispose(&self) {
        if !self.lifecycle.dispose() {
            debug!("Presence service already disposed");
            return;
        }

        self.shutdown.cancel();
        self.watcher.stop();
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }

        self.store.write().await.clear();
        *self.identity.write().await = None;

        self.writer.emit(PresenceEventPayload::Disconnect);
        info!(device = %self.writer.device(), "Presence tracking disposed");
    }

    /// Copy of the local snapshot.
    pub async fn snapshot(&self) -> SessionStore {
        self.store.read().await.clone()
    }

    /// This device's status.
    pub async fn status(&self) -> PresenceStatus {
        self.store.read().await.status
    }

    /// This device's session.
    pub async fn current_session(&self) -> Option<Session> {
        self.store.read().await.current_session.clone()
    }

    /// Every known session of the identity.
    pub async fn sessions(&self) -> Vec<Session> {
        self.store.read().await.sessions.clone()
    }

    /// Whether initialization is in progress.
    pub async fn is_loading(&self) -> bool {
        self.store.read().await.loading
    }

    /// Most recent recorded failure.
    pub async fn error(&self) -> Option<AppError> {
        self.store.read().await.error.clone()
    }

    /// The bound identity.
    pub async fn identity(&self) -> Option<IdentityId> {
        self.identity.read().await.clone()
    }

    /// Lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    /// Whether tracking is active.
    pub fn is_initialized(&self) -> bool {
        self.lifecycle.is_tracking()
    }

    /// Whether location permission was granted.
    pub fn has_location_consent(&self) -> bool {
        self.location.has_consent()
    }

    /// This device's fingerprint.
    pub fn device(&self) -> &DeviceFingerprint {
        self.writer.device()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PresenceService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

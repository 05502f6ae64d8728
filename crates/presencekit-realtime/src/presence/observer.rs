//! Observers turning liveness, visibility, and remote updates into
//! presence transitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use presencekit_core::error::AppError;
use presencekit_core::events::PresenceEventPayload;
use presencekit_core::traits::backend::{WatchEvent, WatchStream};
use presencekit_core::types::{IdentityId, PresenceStatus, SessionId, SessionList};

use super::lifecycle::Lifecycle;
use super::registrar::DisconnectRegistrar;
use super::writer::PresenceWriter;

/// Host page visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityState {
    /// The page is in the foreground.
    Visible,
    /// The page is hidden (tab switched, window minimized).
    Hidden,
}

/// Reacts to the backend's boolean liveness signal.
#[derive(Debug)]
pub struct ConnectivityObserver {
    writer: Arc<PresenceWriter>,
    registrar: Arc<DisconnectRegistrar>,
    identity: IdentityId,
    was_connected: bool,
}

impl ConnectivityObserver {
    /// Create an observer for `identity`.
    pub fn new(
        writer: Arc<PresenceWriter>,
        registrar: Arc<DisconnectRegistrar>,
        identity: IdentityId,
    ) -> Self {
        Self {
            writer,
            registrar,
            identity,
            was_connected: false,
        }
    }

    /// Handle one liveness value.
    ///
    /// Connected: write `online`, then re-arm the disconnect fallback.
    /// Disconnected after having been connected: write `offline`, falling
    /// back to a local-only status change if the write fails.
    pub async fn on_liveness(&mut self, connected: bool) {
        let previously = std::mem::replace(&mut self.was_connected, connected);

        if connected {
            info!(identity = %self.identity, "Connection established");
            if self.writer.set_presence(PresenceStatus::Online).await.is_err() {
                return;
            }
            if let Err(err) = self.registrar.arm(&self.identity).await {
                warn!(error = %err, "Failed to arm disconnect fallback");
                self.writer.store().write().await.record_error(err.clone());
                self.writer.emit(PresenceEventPayload::error(&err));
            }
        } else if previously {
            info!(identity = %self.identity, "Connection lost");
            if self.writer.set_presence(PresenceStatus::Offline).await.is_err() {
                self.writer.apply_local_status(PresenceStatus::Offline).await;
            }
        } else {
            debug!(identity = %self.identity, "Not connected yet");
        }
    }

    /// Handle a failure of the liveness subscription. The status is left
    /// untouched.
    pub async fn on_error(&self, err: AppError) {
        warn!(error = %err, "Liveness signal failed");
        self.writer.store().write().await.record_error(err.clone());
        self.writer.emit(PresenceEventPayload::error(&err));
    }

    /// Drive the observer from `stream` until it ends or `cancel` fires.
    pub fn spawn(mut self, mut stream: WatchStream, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = stream.recv() => match event {
                        Some(WatchEvent::Value(value)) => {
                            let connected = matches!(value, Some(Value::Bool(true)));
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = self.on_liveness(connected) => {}
                            }
                        }
                        Some(WatchEvent::Error(err)) => self.on_error(err).await,
                        None => break,
                    }
                }
            }
            debug!(identity = %self.identity, "Connectivity observer stopped");
        })
    }
}

/// Keeps the local snapshot in step with pushes of the persisted list.
pub fn spawn_session_sync(
    writer: Arc<PresenceWriter>,
    session_id: SessionId,
    mut stream: WatchStream,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = stream.recv() => event,
            };

            match event {
                Some(WatchEvent::Value(value)) => match SessionList::from_value(value) {
                    Ok(list) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        writer.store().write().await.apply_remote(list, &session_id);
                    }
                    Err(err) => {
                        warn!(error = %err, "Undecodable session list pushed");
                        writer.emit(PresenceEventPayload::error(&err));
                    }
                },
                Some(WatchEvent::Error(err)) => {
                    warn!(error = %err, "Session list subscription failed");
                    writer.store().write().await.record_error(err.clone());
                    writer.emit(PresenceEventPayload::error(&err));
                }
                None => break,
            }
        }
        debug!(session_id = %session_id, "Session sync stopped");
    })
}

/// Maps page visibility onto `away`/`online` once tracking has started.
#[derive(Debug, Clone)]
pub struct VisibilityObserver {
    lifecycle: Arc<Lifecycle>,
    writer: Arc<PresenceWriter>,
}

impl VisibilityObserver {
    /// Create an observer gated by `lifecycle`.
    pub fn new(lifecycle: Arc<Lifecycle>, writer: Arc<PresenceWriter>) -> Self {
        Self { lifecycle, writer }
    }

    /// Handle a visibility change. Returns the status that was requested, or
    /// `None` when the change was ignored because tracking has not started.
    /// Write failures are logged and absorbed.
    pub async fn on_change(&self, visibility: VisibilityState) -> Option<PresenceStatus> {
        if !self.lifecycle.is_tracking() {
            debug!(?visibility, "Ignoring visibility change before initialization");
            return None;
        }

        let status = match visibility {
            VisibilityState::Hidden => PresenceStatus::Away,
            VisibilityState::Visible => PresenceStatus::Online,
        };

        if let Err(err) = self.writer.set_presence(status).await {
            warn!(error = %err, %status, "Visibility-driven presence write failed");
        }
        Some(status)
    }

    /// Follow a visibility signal until it closes or `cancel` fires.
    pub fn spawn(
        self,
        mut signal: watch::Receiver<VisibilityState>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = signal.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let visibility = *signal.borrow_and_update();
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = self.on_change(visibility) => {}
                        }
                    }
                }
            }
            debug!("Visibility observer stopped");
        })
    }
}

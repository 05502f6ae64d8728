//! Periodic location refresh.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use presencekit_core::events::PresenceEventPayload;

use crate::presence::writer::PresenceWriter;

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Re-captures the location on a fixed period and rewrites presence with
/// the current status whenever a location is available.
#[derive(Default)]
pub struct LocationWatcher {
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for LocationWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationWatcher")
            .field("running", &self.is_running())
            .finish()
    }
}

impl LocationWatcher {
    /// Create a stopped watcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the refresh task is active.
    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Start refreshing every `period`. A no-op when already running.
    ///
    /// The first refresh happens one full period after starting. The task
    /// also stops when `parent` is cancelled.
    pub fn start(&self, writer: Arc<PresenceWriter>, period: Duration, parent: &CancellationToken) {
        let mut running = self.lock();
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return;
        }

        let cancel = parent.child_token();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = refresh(&writer) => {}
                        }
                    }
                }
            }
            debug!("Location refresh stopped");
        });

        debug!(period_ms = period.as_millis() as u64, "Location refresh started");
        *running = Some(Running { cancel, task });
    }

    /// Stop refreshing. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(running) = self.lock().take() {
            running.cancel.cancel();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for LocationWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn refresh(writer: &PresenceWriter) {
    let Some(location) = writer.location().capture().await else {
        return;
    };

    let status = {
        let store = writer.store().read().await;
        if store.current_session.is_none() {
            return;
        }
        store.status
    };

    match writer.write_status(status, Some(location)).await {
        Ok(_) => writer.emit(PresenceEventPayload::LocationUpdate { location }),
        Err(err) => warn!(error = %err, "Location refresh write failed"),
    }
}

//! Shared helpers for presence integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use presencekit_core::config::presence::PresenceConfig;
use presencekit_core::events::{PresenceEvent, PresenceEventKind};
use presencekit_core::traits::clock::{Clock, ManualClock};
use presencekit_core::types::{DeviceFingerprint, IdentityId, SessionList};
use presencekit_realtime::{MemoryClient, MemoryDatabase, PresenceService};

pub const TTL_MS: u64 = 1_800_000;

/// One simulated device bound to a shared database.
pub struct Device {
    pub client: MemoryClient,
    pub service: PresenceService,
    pub events: broadcast::Receiver<PresenceEvent>,
    pub log: Arc<Mutex<Vec<PresenceEvent>>>,
}

impl Device {
    pub fn new(db: &Arc<MemoryDatabase>, label: &str, clock: &Arc<ManualClock>) -> Self {
        Self::with_config(db, label, clock, PresenceConfig {
            session_ttl_ms: TTL_MS,
            ..Default::default()
        })
    }

    pub fn with_config(
        db: &Arc<MemoryDatabase>,
        label: &str,
        clock: &Arc<ManualClock>,
        config: PresenceConfig,
    ) -> Self {
        let client = db.client();
        let clock: Arc<dyn Clock> = clock.clone();
        let service = PresenceService::builder(Arc::new(client.clone()), DeviceFingerprint::new(label))
            .config(config)
            .clock(clock)
            .build()
            .expect("valid presence config");

        let events = service.events();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let _handle = service.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        Self {
            client,
            service,
            events,
            log,
        }
    }

    /// Wait for the next event of `kind`, skipping others.
    pub async fn next(&mut self, kind: PresenceEventKind) -> PresenceEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.events.recv().await.expect("event bus closed");
                if event.kind() == kind {
                    return event;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {kind:?}"))
    }

    /// Count logged events of `kind`.
    pub fn count(&self, kind: PresenceEventKind) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }
}

pub fn u1() -> IdentityId {
    IdentityId::new("U1")
}

pub fn persisted(db: &MemoryDatabase, identity: &IdentityId) -> SessionList {
    SessionList::from_value(db.get(&SessionList::path(identity))).expect("decodable session list")
}

/// Poll `condition` until it holds.
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

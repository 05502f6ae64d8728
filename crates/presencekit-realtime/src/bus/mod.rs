//! Fan-out of presence events to interested observers.
//!
//! Callbacks registered with [`EventBus::subscribe`] run synchronously, in
//! registration order, on the task that emits. Async consumers can take a
//! [`broadcast`] receiver instead. Neither path queues or replays events for
//! late subscribers beyond the broadcast buffer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::broadcast;
use tracing::trace;

use presencekit_core::events::PresenceEvent;

/// Callback invoked for every emitted event.
pub type Listener = Arc<dyn Fn(&PresenceEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    entries: Vec<(u64, Listener)>,
}

struct BusInner {
    listeners: Mutex<Listeners>,
    next_id: AtomicU64,
    tx: broadcast::Sender<PresenceEvent>,
}

/// Presence event bus. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Create a bus whose broadcast view buffers up to `buffer_size` events.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(Listeners::default()),
                next_id: AtomicU64::new(1),
                tx,
            }),
        }
    }

    /// Register a callback. The returned handle removes it again.
    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().entries.push((id, Arc::new(callback)));
        ListenerHandle {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Receive events asynchronously from now on.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<PresenceEvent> {
        self.inner.tx.subscribe()
    }

    /// Deliver `event` to every current subscriber.
    pub fn emit(&self, event: PresenceEvent) {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let listeners: Vec<Listener> = self
            .lock()
            .entries
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        trace!(kind = ?event.kind(), listeners = listeners.len(), "Emitting presence event");

        for listener in &listeners {
            listener(&event);
        }

        let _ = self.inner.tx.send(event);
    }

    /// Number of registered callbacks.
    pub fn listener_count(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.inner.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// De-registration handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle leaves the callback registered.
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    bus: Weak<BusInner>,
}

impl ListenerHandle {
    /// Remove the callback. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut listeners = bus.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.entries.len();
        listeners.entries.retain(|(id, _)| *id != self.id);
        listeners.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presencekit_core::events::{PresenceEventKind, PresenceEventPayload};

    fn collect(bus: &EventBus, tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> ListenerHandle {
        let log = Arc::clone(log);
        bus.subscribe(move |event| {
            log.lock()
                .unwrap()
                .push(format!("{tag}:{:?}", event.kind()));
        })
    }

    #[test]
    fn test_emit_in_registration_order() {
        let bus = EventBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = collect(&bus, "a", &log);
        let _b = collect(&bus, "b", &log);

        bus.emit(PresenceEvent::now(PresenceEventPayload::Disconnect));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:Disconnect".to_string(), "b:Disconnect".to_string()]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = collect(&bus, "a", &log);
        let _b = collect(&bus, "b", &log);

        assert!(a.unsubscribe());
        bus.emit(PresenceEvent::now(PresenceEventPayload::Disconnect));

        assert_eq!(*log.lock().unwrap(), vec!["b:Disconnect".to_string()]);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::default();
        bus.emit(PresenceEvent::now(PresenceEventPayload::Disconnect));

        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = collect(&bus, "a", &log);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_listener_may_unsubscribe_during_emit() {
        let bus = EventBus::default();
        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let slot_clone = Arc::clone(&slot);
        let handle = bus.subscribe(move |_| {
            if let Some(h) = slot_clone.lock().unwrap().take() {
                h.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(handle);

        bus.emit(PresenceEvent::now(PresenceEventPayload::Disconnect));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_view_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_channel();

        bus.emit(PresenceEvent::now(PresenceEventPayload::Disconnect));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), PresenceEventKind::Disconnect);
    }
}

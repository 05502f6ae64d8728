//! In-process realtime backend.
//!
//! A [`MemoryDatabase`] is the shared store every device sees. Each device
//! talks to it through its own [`MemoryClient`], which carries that device's
//! liveness signal, its armed disconnect fallbacks, and failure injection
//! knobs for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use presencekit_core::error::AppError;
use presencekit_core::result::AppResult;
use presencekit_core::traits::backend::{CONNECTED_PATH, RealtimeBackend, WatchEvent, WatchStream};

type Watchers = Vec<mpsc::UnboundedSender<WatchEvent>>;

/// Shared in-memory store with per-path push subscriptions.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    /// Path → stored value
    data: DashMap<String, Value>,
    /// Path → live subscriptions
    watchers: DashMap<String, Watchers>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a new device connection. The client starts disconnected.
    pub fn client(self: &Arc<Self>) -> MemoryClient {
        MemoryClient {
            db: Arc::clone(self),
            state: Arc::new(ClientState::default()),
        }
    }

    /// Current value at `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.data.get(path).map(|r| r.value().clone())
    }

    /// Overwrite `path` and notify its watchers.
    pub fn set(&self, path: &str, value: Value) {
        self.data.insert(path.to_string(), value.clone());
        self.notify(path, Some(value));
    }

    /// Remove `path` and notify its watchers.
    pub fn remove(&self, path: &str) {
        self.data.remove(path);
        self.notify(path, None);
    }

    /// Number of live subscriptions on `path`.
    pub fn watcher_count(&self, path: &str) -> usize {
        self.watchers
            .get_mut(path)
            .map(|mut r| {
                r.retain(|tx| !tx.is_closed());
                r.len()
            })
            .unwrap_or(0)
    }

    fn watch(&self, path: &str) -> WatchStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(WatchEvent::Value(self.get(path)));
        self.watchers.entry(path.to_string()).or_default().push(tx);
        rx
    }

    fn notify(&self, path: &str, value: Option<Value>) {
        if let Some(mut watchers) = self.watchers.get_mut(path) {
            watchers.retain(|tx| tx.send(WatchEvent::Value(value.clone())).is_ok());
        }
    }
}

#[derive(Debug, Default)]
struct ClientState {
    connected: AtomicBool,
    connected_watchers: Mutex<Watchers>,
    fallbacks: Mutex<HashMap<String, Value>>,
    fail_reads: AtomicU32,
    fail_writes: AtomicU32,
    fail_fallbacks: AtomicU32,
    fail_watches: AtomicU32,
    writes: AtomicUsize,
}

/// One device's connection to a [`MemoryDatabase`].
///
/// Cloning yields another handle to the same connection, so a test can keep
/// driving the liveness signal after handing the client to a service.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    db: Arc<MemoryDatabase>,
    state: Arc<ClientState>,
}

impl MemoryClient {
    /// The database this client talks to.
    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }

    /// Whether the simulated connection is live.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Establish the connection and push `true` to liveness watchers.
    pub fn connect(&self) {
        self.state.connected.store(true, Ordering::SeqCst);
        self.push_connected(WatchEvent::Value(Some(Value::Bool(true))));
    }

    /// Lose the connection uncleanly.
    ///
    /// The server commits every armed fallback, then the client observes
    /// `false` on its liveness signal.
    pub fn drop_connection(&self) {
        self.commit_fallbacks();
        self.state.connected.store(false, Ordering::SeqCst);
        self.push_connected(WatchEvent::Value(Some(Value::Bool(false))));
    }

    /// Disconnect cleanly: armed fallbacks are discarded, not committed.
    pub fn disconnect(&self) {
        self.lock_fallbacks().clear();
        self.state.connected.store(false, Ordering::SeqCst);
        self.push_connected(WatchEvent::Value(Some(Value::Bool(false))));
    }

    /// The client vanishes (process killed). The server commits every armed
    /// fallback; the client itself observes nothing.
    pub fn crash(&self) {
        self.commit_fallbacks();
        self.state.connected.store(false, Ordering::SeqCst);
    }

    /// Fail the liveness subscription with `err`.
    pub fn fail_liveness(&self, err: AppError) {
        self.push_connected(WatchEvent::Error(err));
    }

    /// Make the next `n` reads fail.
    pub fn fail_next_reads(&self, n: u32) {
        self.state.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.state.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` fallback registrations fail.
    pub fn fail_next_fallbacks(&self, n: u32) {
        self.state.fail_fallbacks.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` watch subscriptions fail.
    pub fn fail_next_watches(&self, n: u32) {
        self.state.fail_watches.store(n, Ordering::SeqCst);
    }

    /// The fallback currently armed at `path`, if any.
    pub fn armed_fallback(&self, path: &str) -> Option<Value> {
        self.lock_fallbacks().get(path).cloned()
    }

    /// Number of successful writes issued by this client.
    pub fn write_count(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    fn commit_fallbacks(&self) {
        let armed: Vec<(String, Value)> = self.lock_fallbacks().drain().collect();
        for (path, value) in armed {
            debug!(path = %path, "Committing disconnect fallback");
            self.db.set(&path, value);
        }
    }

    fn push_connected(&self, event: WatchEvent) {
        let mut watchers = self
            .state
            .connected_watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        watchers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock_fallbacks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.state
            .fallbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Consume one unit of an injected failure budget.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl RealtimeBackend for MemoryClient {
    async fn read(&self, path: &str) -> AppResult<Option<Value>> {
        if take_failure(&self.state.fail_reads) {
            return Err(AppError::backend(format!("read of '{path}' failed")));
        }
        Ok(self.db.get(path))
    }

    async fn write(&self, path: &str, value: Value) -> AppResult<()> {
        if take_failure(&self.state.fail_writes) {
            return Err(AppError::backend(format!("write to '{path}' failed")));
        }
        self.db.set(path, value);
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn register_fallback(&self, path: &str, value: Value) -> AppResult<()> {
        if take_failure(&self.state.fail_fallbacks) {
            return Err(AppError::backend(format!(
                "fallback registration at '{path}' failed"
            )));
        }
        self.lock_fallbacks().insert(path.to_string(), value);
        Ok(())
    }

    async fn watch(&self, path: &str) -> AppResult<WatchStream> {
        if take_failure(&self.state.fail_watches) {
            return Err(AppError::backend(format!("watch of '{path}' failed")));
        }
        if path != CONNECTED_PATH {
            return Ok(self.db.watch(path));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(WatchEvent::Value(Some(Value::Bool(self.is_connected()))));
        self.state
            .connected_watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn next_value(rx: &mut WatchStream) -> Option<Value> {
        match rx.try_recv().expect("event pending") {
            WatchEvent::Value(v) => v,
            WatchEvent::Error(e) => panic!("unexpected watch error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let db = MemoryDatabase::new();
        let client = db.client();

        client.write("a/b", json!({"x": 1})).await.unwrap();
        assert_eq!(client.read("a/b").await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(client.read("missing").await.unwrap(), None);
        assert_eq!(client.write_count(), 1);
    }

    #[tokio::test]
    async fn test_watch_delivers_current_then_changes() {
        let db = MemoryDatabase::new();
        let client = db.client();
        db.set("p", json!(1));

        let mut rx = client.watch("p").await.unwrap();
        assert_eq!(next_value(&mut rx), Some(json!(1)));

        client.write("p", json!(2)).await.unwrap();
        assert_eq!(next_value(&mut rx), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_dropped_watch_is_pruned() {
        let db = MemoryDatabase::new();
        let client = db.client();
        let rx = client.watch("p").await.unwrap();
        assert_eq!(db.watcher_count("p"), 1);
        drop(rx);
        assert_eq!(db.watcher_count("p"), 0);
    }

    #[tokio::test]
    async fn test_liveness_signal() {
        let db = MemoryDatabase::new();
        let client = db.client();

        let mut rx = client.watch(CONNECTED_PATH).await.unwrap();
        assert_eq!(next_value(&mut rx), Some(json!(false)));

        client.connect();
        assert_eq!(next_value(&mut rx), Some(json!(true)));

        client.disconnect();
        assert_eq!(next_value(&mut rx), Some(json!(false)));
    }

    #[tokio::test]
    async fn test_unclean_drop_commits_fallback() {
        let db = MemoryDatabase::new();
        let client = db.client();
        client.connect();

        client.register_fallback("s", json!("gone")).await.unwrap();
        assert_eq!(db.get("s"), None);

        client.drop_connection();
        assert_eq!(db.get("s"), Some(json!("gone")));
        assert!(client.armed_fallback("s").is_none());
    }

    #[tokio::test]
    async fn test_clean_disconnect_discards_fallback() {
        let db = MemoryDatabase::new();
        let client = db.client();
        client.register_fallback("s", json!("gone")).await.unwrap();

        client.disconnect();
        assert_eq!(db.get("s"), None);
    }

    #[tokio::test]
    async fn test_rearm_replaces_fallback() {
        let db = MemoryDatabase::new();
        let client = db.client();
        client.register_fallback("s", json!(1)).await.unwrap();
        client.register_fallback("s", json!(2)).await.unwrap();

        client.crash();
        assert_eq!(db.get("s"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let db = MemoryDatabase::new();
        let client = db.client();
        client.fail_next_writes(1);

        assert!(client.write("p", json!(1)).await.is_err());
        assert!(client.write("p", json!(1)).await.is_ok());
    }
}

//! Realtime data backend abstraction.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::result::AppResult;

/// Path of the boolean liveness signal pushed by the backend.
pub const CONNECTED_PATH: &str = ".info/connected";

/// A push notification from a watched path.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// The value at the path changed; `None` when the path is empty.
    Value(Option<Value>),
    /// The subscription failed.
    Error(AppError),
}

/// Stream of watch notifications. Dropping it cancels the subscription.
pub type WatchStream = mpsc::UnboundedReceiver<WatchEvent>;

/// Trait for realtime databases offering whole-value reads and writes,
/// push subscriptions, and server-side disconnect fallbacks.
///
/// Implementations must deliver the current value to a new watcher before
/// any subsequent change.
#[async_trait]
pub trait RealtimeBackend: Send + Sync + std::fmt::Debug + 'static {
    /// One-shot fetch. Returns `None` when nothing is stored at `path`.
    async fn read(&self, path: &str) -> AppResult<Option<Value>>;

    /// Overwrite the whole value at `path`.
    async fn write(&self, path: &str, value: Value) -> AppResult<()>;

    /// Arm a value to be committed at `path` by the server if this client
    /// disconnects uncleanly. Re-arming the same path replaces the value.
    async fn register_fallback(&self, path: &str, value: Value) -> AppResult<()>;

    /// Subscribe to changes at `path`.
    async fn watch(&self, path: &str) -> AppResult<WatchStream>;
}

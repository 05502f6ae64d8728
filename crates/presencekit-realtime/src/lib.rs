//! # presencekit-realtime
//!
//! Presence engine for PresenceKit. Provides:
//!
//! - Synchronous event bus with a broadcast view for async consumers
//! - Per-device session store and the presence writer (read-modify-write
//!   of the identity's session list with TTL pruning)
//! - Connectivity and visibility observers driving online/away/offline
//! - Disconnect fallback registration
//! - Optional location capture (device, custom resolver, network lookup)
//!   with periodic refresh
//! - An in-memory realtime backend for tests and local simulation

pub mod backend;
pub mod bus;
pub mod location;
pub mod presence;

pub use backend::memory::{MemoryClient, MemoryDatabase};
pub use bus::{EventBus, ListenerHandle};
pub use location::capture::LocationCapture;
pub use presence::lifecycle::LifecycleState;
pub use presence::observer::VisibilityState;
pub use presence::service::{PresenceService, PresenceServiceBuilder};
pub use presence::store::SessionStore;

//! Multi-device presence tracking.

pub mod lifecycle;
pub mod observer;
pub mod registrar;
pub mod service;
pub mod store;
pub mod writer;

pub use lifecycle::LifecycleState;
pub use observer::VisibilityState;
pub use registrar::DisconnectRegistrar;
pub use service::{PresenceService, PresenceServiceBuilder};
pub use store::SessionStore;
pub use writer::PresenceWriter;

//! Shared types used across all PresenceKit crates.

pub mod id;
pub mod session;

pub use id::{DeviceFingerprint, IdentityId, SessionId};
pub use session::{Location, PresenceStatus, Session, SessionList};

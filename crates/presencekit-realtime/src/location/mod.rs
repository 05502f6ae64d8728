//! Optional location capture.
//!
//! Capture is gated by `geolocation.enabled` and, when
//! `geolocation.require_consent` is set, by an explicit permission grant.
//! Every strategy yields a [`Location`](presencekit_core::types::Location)
//! or nothing; failures are logged and never surface to presence writes.

pub mod capture;
pub mod network;
pub mod watcher;

pub use capture::LocationCapture;
pub use watcher::LocationWatcher;

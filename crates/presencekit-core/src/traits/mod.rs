//! Core traits defined in `presencekit-core` and implemented by backends,
//! hosts, and other crates.

pub mod backend;
pub mod clock;
pub mod location;

pub use backend::{CONNECTED_PATH, RealtimeBackend, WatchEvent, WatchStream};
pub use clock::{Clock, ManualClock, SystemClock};
pub use location::{Coordinates, CustomLocationFn, DeviceLocator, PermissionState};

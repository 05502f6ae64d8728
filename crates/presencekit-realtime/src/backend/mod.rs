//! Realtime backend implementations.

pub mod memory;

//! # presencekit-core
//!
//! Core crate for PresenceKit. Contains configuration schemas, typed
//! identifiers, the multi-device session model, presence events, the
//! collaborator traits implemented by backends and hosts, and the unified
//! error system.
//!
//! This crate has **no** internal dependencies on other PresenceKit crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;

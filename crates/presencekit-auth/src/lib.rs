//! # presencekit-auth
//!
//! Auth-state cache for the signed-in identity.
//!
//! ## Modules
//!
//! - `user`: signed-in user, custom claims, and profile document types
//! - `provider`: identity provider seam and an in-memory implementation
//! - `manager`: auth-state cache with profile bootstrap and claim checks
//! - `guard`: throttled route guard evaluation

pub mod guard;
pub mod manager;
pub mod provider;
pub mod user;

pub use guard::{GuardConfig, GuardOutcome, Redirect};
pub use manager::{AuthManager, AuthSnapshot};
pub use provider::{IdentityProvider, MemoryIdentityProvider};
pub use user::{AuthUser, Claims, UserProfile};

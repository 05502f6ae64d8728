//! Host-side location collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::result::AppResult;

/// Raw coordinates returned by a location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Permission state for device location access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Access already granted.
    Granted,
    /// The user has not decided yet; a position request will prompt.
    Prompt,
    /// Access refused.
    Denied,
}

/// Device-reported positioning provided by the host environment.
#[async_trait]
pub trait DeviceLocator: Send + Sync + std::fmt::Debug + 'static {
    /// Query the current permission state without prompting.
    async fn permission(&self) -> AppResult<PermissionState>;

    /// Request the current position. May suspend on a permission prompt.
    async fn current_position(&self) -> AppResult<Coordinates>;
}

/// Caller-supplied asynchronous location resolver.
pub type CustomLocationFn = Arc<dyn Fn() -> BoxFuture<'static, AppResult<Coordinates>> + Send + Sync>;

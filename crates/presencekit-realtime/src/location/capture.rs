//! Consent-gated location resolution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use presencekit_core::config::presence::{GeolocationConfig, GeolocationStrategy};
use presencekit_core::error::AppError;
use presencekit_core::result::AppResult;
use presencekit_core::traits::clock::Clock;
use presencekit_core::traits::location::{
    Coordinates, CustomLocationFn, DeviceLocator, PermissionState,
};
use presencekit_core::types::Location;

use super::network;

/// Resolves the current device's location according to configuration.
pub struct LocationCapture {
    config: GeolocationConfig,
    consent: AtomicBool,
    clock: Arc<dyn Clock>,
    device: Option<Arc<dyn DeviceLocator>>,
    custom: Option<CustomLocationFn>,
    http: reqwest::Client,
}

impl std::fmt::Debug for LocationCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationCapture")
            .field("config", &self.config)
            .field("consent", &self.has_consent())
            .field("device", &self.device.is_some())
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl LocationCapture {
    /// Create a capture with the given policy and no sources attached.
    pub fn new(config: GeolocationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            consent: AtomicBool::new(false),
            clock,
            device: None,
            custom: None,
            http: reqwest::Client::new(),
        }
    }

    /// Attach the host's device positioning.
    pub fn with_device_locator(mut self, locator: Arc<dyn DeviceLocator>) -> Self {
        self.device = Some(locator);
        self
    }

    /// Attach a caller-supplied resolver.
    pub fn with_custom_resolver(mut self, resolver: CustomLocationFn) -> Self {
        self.custom = Some(resolver);
        self
    }

    /// Use a specific HTTP client for the network strategy.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// The policy in effect.
    pub fn config(&self) -> &GeolocationConfig {
        &self.config
    }

    /// Whether location capture is switched on.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether permission has been granted.
    pub fn has_consent(&self) -> bool {
        self.consent.load(Ordering::SeqCst)
    }

    /// Whether coordinates may be read right now.
    pub fn is_permitted(&self) -> bool {
        self.config.enabled && (!self.config.require_consent || self.has_consent())
    }

    /// Ask for permission to read the location.
    ///
    /// For device positioning an already-granted permission short-circuits;
    /// otherwise a bounded probe request decides. Non-device strategies need
    /// no prompt and are granted immediately.
    pub async fn request_consent(&self) -> bool {
        if !self.config.enabled {
            return false;
        }

        let granted = match self.config.strategy {
            GeolocationStrategy::Device => match self.probe_device_permission().await {
                Ok(granted) => granted,
                Err(err) => {
                    warn!(error = %err, "Error requesting location consent");
                    false
                }
            },
            GeolocationStrategy::Custom | GeolocationStrategy::Network => true,
        };

        self.consent.store(granted, Ordering::SeqCst);
        debug!(granted, strategy = %self.config.strategy, "Location consent resolved");
        granted
    }

    /// Resolve the current location, or `None` when capture is off, not
    /// permitted, or fails.
    pub async fn capture(&self) -> Option<Location> {
        if !self.is_permitted() {
            return None;
        }

        match self.resolve().await {
            Ok(coords) => Some(Location {
                latitude: coords.latitude,
                longitude: coords.longitude,
                last_updated: self.clock.now(),
            }),
            Err(err) => {
                warn!(error = %err, strategy = %self.config.strategy, "Error getting location");
                None
            }
        }
    }

    async fn resolve(&self) -> AppResult<Coordinates> {
        match self.config.strategy {
            GeolocationStrategy::Device => {
                let locator = self
                    .device
                    .as_ref()
                    .ok_or_else(|| AppError::location("no device locator attached"))?;
                self.bounded_position(locator.as_ref()).await
            }
            GeolocationStrategy::Custom => {
                let resolver = self
                    .custom
                    .as_ref()
                    .ok_or_else(|| AppError::location("no custom resolver attached"))?;
                resolver().await
            }
            GeolocationStrategy::Network => {
                let url = self
                    .config
                    .ip_service_url
                    .as_deref()
                    .ok_or_else(|| AppError::location("no network lookup URL configured"))?;
                network::lookup(&self.http, url).await
            }
        }
    }

    async fn probe_device_permission(&self) -> AppResult<bool> {
        let locator = self
            .device
            .as_ref()
            .ok_or_else(|| AppError::location("no device locator attached"))?;

        match locator.permission().await? {
            PermissionState::Granted => Ok(true),
            PermissionState::Denied => Ok(false),
            PermissionState::Prompt => Ok(self.bounded_position(locator.as_ref()).await.is_ok()),
        }
    }

    async fn bounded_position(&self, locator: &dyn DeviceLocator) -> AppResult<Coordinates> {
        tokio::time::timeout(self.config.timeout(), locator.current_position())
            .await
            .map_err(|_| {
                AppError::location(format!(
                    "device position not available within {}ms",
                    self.config.timeout_ms
                ))
            })?
    }
}

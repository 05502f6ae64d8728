//! Presence tracking configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Upper bound on `session_ttl_ms`: one hundred years.
pub const MAX_SESSION_TTL_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Presence service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Age in milliseconds after which a session is pruned from the
    /// identity's session list. `0` disables pruning.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_ms: u64,
    /// Period in milliseconds between periodic location refresh attempts.
    #[serde(default = "default_update_interval")]
    pub update_interval_ms: u64,
    /// Location capture settings.
    #[serde(default)]
    pub geolocation: GeolocationConfig,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: default_session_ttl(),
            update_interval_ms: default_update_interval(),
            geolocation: GeolocationConfig::default(),
        }
    }
}

impl PresenceConfig {
    /// Session TTL as a chrono duration, or `None` when pruning is disabled.
    pub fn session_ttl(&self) -> Option<chrono::Duration> {
        if self.session_ttl_ms == 0 {
            None
        } else {
            Some(chrono::Duration::milliseconds(self.session_ttl_ms as i64))
        }
    }

    /// Location refresh period.
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Reject settings that cannot work at runtime.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.update_interval_ms == 0 {
            return Err(AppError::configuration(
                "presence.update_interval_ms must be greater than zero",
            ));
        }
        if self.session_ttl_ms > MAX_SESSION_TTL_MS {
            return Err(AppError::configuration(format!(
                "presence.session_ttl_ms must not exceed {MAX_SESSION_TTL_MS}"
            )));
        }
        let geo = &self.geolocation;
        if geo.enabled
            && geo.strategy == GeolocationStrategy::Network
            && geo.ip_service_url.as_deref().is_none_or(str::is_empty)
        {
            return Err(AppError::configuration(
                "presence.geolocation.ip_service_url is required for the network strategy",
            ));
        }
        Ok(())
    }
}

/// Location capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    /// Whether location capture is enabled at all.
    #[serde(default)]
    pub enabled: bool,
    /// Which location source to use.
    #[serde(rename = "type", default)]
    pub strategy: GeolocationStrategy,
    /// Whether explicit permission must be granted before reading coordinates.
    #[serde(default = "default_true")]
    pub require_consent: bool,
    /// Endpoint for the network-address lookup strategy.
    #[serde(default)]
    pub ip_service_url: Option<String>,
    /// Upper bound on a single device position request, in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: GeolocationStrategy::default(),
            require_consent: true,
            ip_service_url: None,
            timeout_ms: default_timeout(),
        }
    }
}

impl GeolocationConfig {
    /// Device position request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Location source selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeolocationStrategy {
    /// Coordinates reported by the host device (may prompt for permission).
    #[serde(alias = "browser")]
    Device,
    /// A caller-supplied asynchronous resolver.
    Custom,
    /// HTTP lookup keyed by the client's network address.
    #[serde(alias = "ip")]
    Network,
}

impl Default for GeolocationStrategy {
    fn default() -> Self {
        Self::Device
    }
}

impl std::fmt::Display for GeolocationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeolocationStrategy::Device => write!(f, "device"),
            GeolocationStrategy::Custom => write!(f, "custom"),
            GeolocationStrategy::Network => write!(f, "network"),
        }
    }
}

fn default_session_ttl() -> u64 {
    30 * 60 * 1000
}

fn default_update_interval() -> u64 {
    60 * 1000
}

fn default_timeout() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ttl_disables_pruning() {
        let config = PresenceConfig {
            session_ttl_ms: 0,
            ..Default::default()
        };
        assert!(config.session_ttl().is_none());
    }

    #[test]
    fn test_ttl_conversion() {
        let config = PresenceConfig::default();
        assert_eq!(
            config.session_ttl(),
            Some(chrono::Duration::minutes(30))
        );
        assert_eq!(config.update_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        let config = PresenceConfig {
            session_ttl_ms: MAX_SESSION_TTL_MS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PresenceConfig {
            session_ttl_ms: MAX_SESSION_TTL_MS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = PresenceConfig {
            update_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

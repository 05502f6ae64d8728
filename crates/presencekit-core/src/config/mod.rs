//! Library and binary configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every field carries a serde default so an empty file is a
//! valid configuration.

pub mod auth;
pub mod logging;
pub mod presence;

use serde::{Deserialize, Serialize};
use tracing::warn;

use self::auth::AuthConfig;
use self::logging::LoggingConfig;
use self::presence::PresenceConfig;

use crate::error::AppError;

/// Root configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (base file + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Presence tracking settings.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Auth-state cache and guard settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the base file at `path` with an optional `config/{env}` overlay
    /// and environment variables prefixed with `PRESENCEKIT__`
    /// (e.g. `PRESENCEKIT__PRESENCE__SESSION_TTL_MS=60000`).
    pub fn load(path: &str, env: Option<&str>) -> Result<Self, AppError> {
        let mut builder =
            config::Config::builder().add_source(config::File::with_name(path).required(false));

        if let Some(env) = env {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{env}")).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("PRESENCEKIT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        parsed
            .presence
            .validate()
            .inspect_err(|e| warn!(path, error = %e, "Rejected presence configuration"))?;
        Ok(parsed)
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        let parsed: Self = config.try_deserialize()?;
        parsed.presence.validate()?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presence::GeolocationStrategy;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.presence.session_ttl_ms, 30 * 60 * 1000);
        assert_eq!(config.presence.update_interval_ms, 60 * 1000);
        assert!(!config.presence.geolocation.enabled);
        assert!(config.presence.geolocation.require_consent);
        assert_eq!(config.presence.geolocation.strategy, GeolocationStrategy::Device);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.auth.validation_throttle_ms, 1000);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = AppConfig::from_toml_str(
            r#"
            [presence]
            session_ttl_ms = 5000

            [presence.geolocation]
            enabled = true
            type = "network"
            ip_service_url = "http://localhost:9000/geo"
            require_consent = false
            "#,
        )
        .unwrap();

        assert_eq!(config.presence.session_ttl_ms, 5000);
        assert!(config.presence.geolocation.enabled);
        assert_eq!(
            config.presence.geolocation.strategy,
            GeolocationStrategy::Network
        );
        assert!(!config.presence.geolocation.require_consent);
    }

    #[test]
    fn test_network_strategy_requires_url() {
        let result = AppConfig::from_toml_str(
            r#"
            [presence.geolocation]
            enabled = true
            type = "network"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_oversized_ttl() {
        let path = std::env::temp_dir().join("presencekit-oversized-ttl.toml");
        std::fs::write(
            &path,
            "[presence]\nsession_ttl_ms = 100000000000000000\n",
        )
        .unwrap();

        let err = AppConfig::load(path.to_str().unwrap(), None).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
        let _ = std::fs::remove_file(&path);
    }
}

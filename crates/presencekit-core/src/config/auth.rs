//! Auth-state cache and route guard configuration.

use serde::{Deserialize, Serialize};

/// Auth manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Window in milliseconds during which repeated guard validations
    /// short-circuit to "allowed".
    #[serde(default = "default_validation_throttle")]
    pub validation_throttle_ms: u64,
    /// Redirect target for guards that require a signed-in user.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Redirect target for guards that require a signed-out user.
    #[serde(default = "default_home_path")]
    pub home_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            validation_throttle_ms: default_validation_throttle(),
            login_path: default_login_path(),
            home_path: default_home_path(),
        }
    }
}

impl AuthConfig {
    /// Guard validation throttle window.
    pub fn validation_throttle(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.validation_throttle_ms.min(i64::MAX as u64) as i64)
    }
}

fn default_validation_throttle() -> u64 {
    1000
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_home_path() -> String {
    "/dashboard".to_string()
}

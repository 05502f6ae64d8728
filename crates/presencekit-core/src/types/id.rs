//! Newtype wrappers for identity, device, and session identifiers.
//!
//! Identities come from the external auth provider as opaque strings, so
//! unlike UUID-keyed records these wrap `String`. Using distinct types
//! prevents accidentally passing a device fingerprint where an identity is
//! expected.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Macro to define a newtype ID wrapper around `String`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of an authenticated principal.
    IdentityId
);

define_id!(
    /// Identifier derived from the current client device.
    DeviceFingerprint
);

define_id!(
    /// Composite key of one device's session for one identity.
    SessionId
);

impl IdentityId {
    /// Wrap an identity string issued by the auth provider.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

static BROWSER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(firefox|chrome|safari|opera|edge|msie|trident)/?\s*(\d+)")
        .expect("browser token pattern is valid")
});

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9-]").expect("sanitizer pattern is valid"));

impl DeviceFingerprint {
    /// Build a fingerprint from an explicit device label.
    ///
    /// Characters outside `[a-zA-Z0-9-]` are removed, so the result is safe
    /// to embed in backend paths.
    pub fn new(label: &str) -> Self {
        Self(DISALLOWED.replace_all(label, "").into_owned())
    }

    /// Derive a fingerprint from the host's user agent and platform strings.
    ///
    /// The same inputs always produce the same fingerprint.
    pub fn from_user_agent(user_agent: &str, platform: &str) -> Self {
        let browser = BROWSER_TOKEN
            .captures(user_agent)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or("Unknown Browser");

        Self::new(&format!("{browser}-{platform}"))
    }
}

impl SessionId {
    /// Compose the session key for an identity on a device.
    pub fn for_device(identity: &IdentityId, device: &DeviceFingerprint) -> Self {
        Self(format!("{identity}_{device}"))
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    #[test]
    fn test_fingerprint_from_user_agent() {
        let fp = DeviceFingerprint::from_user_agent(CHROME_UA, "Linux x86_64");
        assert_eq!(fp.as_str(), "Chrome-Linuxx8664");
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = DeviceFingerprint::from_user_agent(CHROME_UA, "MacIntel");
        let b = DeviceFingerprint::from_user_agent(CHROME_UA, "MacIntel");
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_browser() {
        let fp = DeviceFingerprint::from_user_agent("curl/8.0", "Win32");
        assert_eq!(fp.as_str(), "UnknownBrowser-Win32");
    }

    #[test]
    fn test_label_is_sanitized() {
        assert_eq!(DeviceFingerprint::new("D1").as_str(), "D1");
        assert_eq!(DeviceFingerprint::new("my phone/#2").as_str(), "myphone2");
    }

    #[test]
    fn test_session_id_composition() {
        let id = SessionId::for_device(&IdentityId::new("U1"), &DeviceFingerprint::new("D1"));
        assert_eq!(id.as_str(), "U1_D1");
    }
}

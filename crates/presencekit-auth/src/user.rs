//! Signed-in user, custom claims, and profile document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use presencekit_core::error::AppError;
use presencekit_core::result::AppResult;
use presencekit_core::types::IdentityId;

/// The user reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    /// Stable identity id.
    pub uid: IdentityId,
    /// Email address, if known.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name, if set.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Avatar URL, if set.
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
    /// Whether the email address has been verified.
    #[serde(default)]
    pub email_verified: bool,
}

impl AuthUser {
    /// A user with only an id.
    pub fn new(uid: impl Into<IdentityId>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            photo_url: None,
            email_verified: false,
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Custom claims carried by the user's id token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// No claims.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a claim.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Raw claim value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether `name` is present with a truthy value.
    ///
    /// `null`, `false`, `0`, and the empty string count as absent.
    pub fn has(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(is_truthy)
    }

    /// Whether every claim in `names` is present and truthy.
    pub fn has_all<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.iter().all(|name| self.has(name.as_ref()))
    }

    /// Whether no claims are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Profile document stored under `users/{uid}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Display name.
    #[serde(default)]
    pub display_name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Avatar URL.
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
    /// When the document was first written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the document was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether the user finished onboarding.
    #[serde(default)]
    pub is_profile_complete: bool,
    /// Application role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Any other application fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// The document created for a user signing in for the first time.
    pub fn initial(user: &AuthUser, now: DateTime<Utc>) -> Self {
        Self {
            display_name: user.display_name.clone().unwrap_or_default(),
            email: user.email.clone().unwrap_or_default(),
            photo_url: user.photo_url.clone().unwrap_or_default(),
            created_at: Some(now),
            updated_at: Some(now),
            is_profile_complete: false,
            role: None,
            extra: Map::new(),
        }
    }

    /// Overlay `patch` onto this profile and stamp `updatedAt`.
    ///
    /// Keys in `patch` use the document's field names (`displayName`,
    /// `isProfileComplete`, ...). Unknown keys land in [`extra`](Self::extra).
    pub fn merged(&self, patch: Map<String, Value>, now: DateTime<Utc>) -> AppResult<Self> {
        let mut doc = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => return Err(AppError::internal("profile did not serialize to an object")),
        };
        doc.extend(patch);

        let mut merged: Self = serde_json::from_value(Value::Object(doc))
            .map_err(|e| AppError::validation(format!("invalid profile patch: {e}")))?;
        merged.updated_at = Some(now);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claim_truthiness() {
        let claims = Claims::new()
            .with("admin", true)
            .with("premium", false)
            .with("tier", 0)
            .with("org", "acme")
            .with("note", "");

        assert!(claims.has("admin"));
        assert!(!claims.has("premium"));
        assert!(!claims.has("tier"));
        assert!(claims.has("org"));
        assert!(!claims.has("note"));
        assert!(!claims.has("missing"));
        assert!(claims.has_all(&["admin", "org"]));
        assert!(!claims.has_all(&["admin", "premium"]));
        assert!(claims.has_all::<&str>(&[]));
    }

    #[test]
    fn test_initial_profile_from_user() {
        let now = DateTime::from_timestamp_millis(1_000).unwrap();
        let user = AuthUser::new("U1").with_email("u1@example.com");
        let profile = UserProfile::initial(&user, now);

        assert_eq!(profile.email, "u1@example.com");
        assert_eq!(profile.display_name, "");
        assert!(!profile.is_profile_complete);
        assert_eq!(profile.created_at, Some(now));

        let doc = serde_json::to_value(&profile).unwrap();
        assert_eq!(doc["photoURL"], json!(""));
        assert_eq!(doc["isProfileComplete"], json!(false));
        assert!(doc.get("role").is_none());
    }

    #[test]
    fn test_merge_patch() {
        let t0 = DateTime::from_timestamp_millis(0).unwrap();
        let t1 = DateTime::from_timestamp_millis(5_000).unwrap();
        let profile = UserProfile::initial(&AuthUser::new("U1"), t0);

        let patch = json!({"displayName": "Ada", "isProfileComplete": true, "theme": "dark"});
        let Value::Object(patch) = patch else { unreachable!() };
        let merged = profile.merged(patch, t1).unwrap();

        assert_eq!(merged.display_name, "Ada");
        assert!(merged.is_profile_complete);
        assert_eq!(merged.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(merged.created_at, Some(t0));
        assert_eq!(merged.updated_at, Some(t1));
    }

    #[test]
    fn test_merge_rejects_mistyped_field() {
        let profile = UserProfile::default();
        let Value::Object(patch) = json!({"isProfileComplete": "yes"}) else {
            unreachable!()
        };
        let err = profile.merged(patch, Utc::now()).unwrap_err();
        assert!(err.is(presencekit_core::error::ErrorKind::Validation));
    }
}

//! Route guards evaluated against the cached auth state.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use crate::manager::{AuthManager, AuthSnapshot};
use crate::user::UserProfile;

/// Predicate over the cached auth state.
pub type AllowIfFn = Arc<dyn Fn(&AuthSnapshot) -> bool + Send + Sync>;

/// Predicate over the profile document.
pub type RequiredDataFn = Arc<dyn Fn(Option<&UserProfile>) -> bool + Send + Sync>;

/// What a guard checks.
#[derive(Clone)]
pub struct GuardConfig {
    /// Whether a signed-in user is required.
    pub auth_required: bool,
    /// Where to send the caller when a check fails.
    pub redirect_to: String,
    /// Claims that must all be set.
    pub required_claims: Vec<String>,
    /// Check against the profile document.
    pub required_data: Option<RequiredDataFn>,
    /// Custom check against the whole auth state.
    pub allow_if: Option<AllowIfFn>,
    /// Extra query parameters added to every redirect.
    pub redirect_params: Vec<(String, String)>,
    /// Path being guarded, sent back as `returnTo` when sign-in is required.
    pub return_to: Option<String>,
}

impl std::fmt::Debug for GuardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardConfig")
            .field("auth_required", &self.auth_required)
            .field("redirect_to", &self.redirect_to)
            .field("required_claims", &self.required_claims)
            .field("required_data", &self.required_data.is_some())
            .field("allow_if", &self.allow_if.is_some())
            .field("redirect_params", &self.redirect_params)
            .field("return_to", &self.return_to)
            .finish()
    }
}

impl GuardConfig {
    /// Require a signed-in user, redirecting to `redirect_to` otherwise.
    pub fn new(redirect_to: impl Into<String>) -> Self {
        Self {
            auth_required: true,
            redirect_to: redirect_to.into(),
            required_claims: Vec::new(),
            required_data: None,
            allow_if: None,
            redirect_params: Vec::new(),
            return_to: None,
        }
    }

    /// Set whether a signed-in user is required.
    pub fn auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    /// Require every claim in `claims`.
    pub fn require_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_claims = claims.into_iter().map(Into::into).collect();
        self
    }

    /// Require the profile document to satisfy `check`.
    pub fn require_data<F>(mut self, check: F) -> Self
    where
        F: Fn(Option<&UserProfile>) -> bool + Send + Sync + 'static,
    {
        self.required_data = Some(Arc::new(check));
        self
    }

    /// Require the auth state to satisfy `check`.
    pub fn allow_if<F>(mut self, check: F) -> Self
    where
        F: Fn(&AuthSnapshot) -> bool + Send + Sync + 'static,
    {
        self.allow_if = Some(Arc::new(check));
        self
    }

    /// Add a query parameter to every redirect.
    pub fn redirect_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.redirect_params.push((key.into(), value.into()));
        self
    }

    /// Record the path being guarded.
    pub fn return_to(mut self, path: impl Into<String>) -> Self {
        self.return_to = Some(path.into());
        self
    }
}

/// Where a failed guard sends the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Target path.
    pub to: String,
    /// Query parameters in insertion order.
    pub params: Vec<(String, String)>,
}

impl Redirect {
    /// Value of query parameter `key`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Result of a guard validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Every check passed.
    Allowed,
    /// A validation ran moments ago; this one was allowed unchecked.
    Throttled,
    /// A check failed.
    Redirect(Redirect),
    /// A check could not be evaluated. See [`AuthManager::last_error`].
    Failed,
}

impl GuardOutcome {
    /// Whether the guarded action may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed | Self::Throttled)
    }
}

impl AuthManager {
    /// Evaluate `guard` against the current auth state.
    ///
    /// Checks run in order: sign-in requirement, `allow_if`, required claims
    /// (freshly read from the id token), then `required_data`. The first
    /// failing check decides the redirect.
    pub async fn validate(&self, guard: GuardConfig) -> GuardOutcome {
        if self.should_throttle() {
            debug!("Guard validation throttled");
            return GuardOutcome::Throttled;
        }

        self.validating.store(true, Ordering::SeqCst);
        *self.lock_error() = None;
        self.wait_for_init().await;

        let outcome = self.evaluate(&guard).await;
        self.validating.store(false, Ordering::SeqCst);

        if let GuardOutcome::Redirect(redirect) = &outcome {
            debug!(to = %redirect.to, "Guard redirect");
        }
        outcome
    }

    async fn evaluate(&self, guard: &GuardConfig) -> GuardOutcome {
        let snapshot = self.snapshot().await;

        if guard.auth_required && !snapshot.is_logged_in() {
            let mut params = guard.redirect_params.clone();
            if let Some(path) = &guard.return_to {
                params.push(("returnTo".to_string(), path.clone()));
            }
            return GuardOutcome::Redirect(Redirect {
                to: guard.redirect_to.clone(),
                params,
            });
        }

        if let Some(allow_if) = &guard.allow_if {
            if !allow_if(&snapshot) {
                return redirect(guard);
            }
        }

        if !guard.required_claims.is_empty() {
            let Some(user) = snapshot.user.as_ref() else {
                return redirect(guard);
            };
            match self.provider.id_token_claims(user).await {
                Ok(claims) if claims.has_all(&guard.required_claims[..]) => {}
                Ok(_) => return redirect(guard),
                Err(err) => {
                    warn!(error = %err, "Failed to refresh id token claims");
                    *self.lock_error() = Some(err);
                    return GuardOutcome::Failed;
                }
            }
        }

        if let Some(required_data) = &guard.required_data {
            if !required_data(snapshot.profile.as_ref()) {
                return redirect(guard);
            }
        }

        GuardOutcome::Allowed
    }

    fn should_throttle(&self) -> bool {
        let now = self.clock.now();
        let mut last = self
            .last_validation
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if last.is_some_and(|at| now - at < self.config.validation_throttle()) {
            return true;
        }
        *last = Some(now);
        false
    }

    /// Require a signed-in user, redirecting to the login path.
    pub async fn require_auth(&self, return_to: Option<&str>) -> GuardOutcome {
        let mut guard = GuardConfig::new(self.config.login_path.clone());
        if let Some(path) = return_to {
            guard = guard.return_to(path);
        }
        self.validate(guard).await
    }

    /// Guard for signed-out-only pages, redirecting to the home path.
    pub async fn require_no_auth(&self) -> GuardOutcome {
        let home = self.config.home_path.clone();
        self.validate(
            GuardConfig::new(home).auth_required(false).allow_if(|s| !s.is_logged_in()),
        )
        .await
    }

    /// Require every claim in `claims`, redirecting to the login path.
    pub async fn require_claims(&self, claims: &[&str]) -> GuardOutcome {
        self.validate(
            GuardConfig::new(self.config.login_path.clone()).require_claims(claims.iter().copied()),
        )
        .await
    }

    /// Require the profile document to satisfy `check`.
    pub async fn require_data<F>(&self, check: F) -> GuardOutcome
    where
        F: Fn(Option<&UserProfile>) -> bool + Send + Sync + 'static,
    {
        self.validate(GuardConfig::new(self.config.login_path.clone()).require_data(check))
            .await
    }
}

fn redirect(guard: &GuardConfig) -> GuardOutcome {
    GuardOutcome::Redirect(Redirect {
        to: guard.redirect_to.clone(),
        params: guard.redirect_params.clone(),
    })
}

//! Auth-state cache for the signed-in identity.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use presencekit_core::config::auth::AuthConfig;
use presencekit_core::error::AppError;
use presencekit_core::result::AppResult;
use presencekit_core::traits::clock::{Clock, SystemClock};
use presencekit_core::types::IdentityId;

use crate::provider::IdentityProvider;
use crate::user::{AuthUser, Claims, UserProfile};

/// Point-in-time copy of the cached auth state.
#[derive(Debug, Clone, Default)]
pub struct AuthSnapshot {
    /// Signed-in user.
    pub user: Option<AuthUser>,
    /// Custom claims of the signed-in user.
    pub claims: Claims,
    /// Profile document of the signed-in user.
    pub profile: Option<UserProfile>,
}

impl AuthSnapshot {
    /// Whether a user is signed in.
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    /// Id of the signed-in user.
    pub fn uid(&self) -> Option<&IdentityId> {
        self.user.as_ref().map(|u| &u.uid)
    }

    /// Whether every claim in `names` is set.
    pub fn has_required_claims<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.claims.has_all(names)
    }

    /// Whether the `admin` claim is set.
    pub fn is_admin(&self) -> bool {
        self.claims.has("admin")
    }

    /// Whether the `premium` claim is set.
    pub fn is_premium(&self) -> bool {
        self.claims.has("premium")
    }
}

/// Caches the signed-in user, their claims, and their profile document.
///
/// Fed by [`handle_auth_state`](Self::handle_auth_state) whenever the
/// identity provider reports a sign-in or sign-out.
pub struct AuthManager {
    pub(crate) config: AuthConfig,
    pub(crate) provider: Arc<dyn IdentityProvider>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: RwLock<AuthSnapshot>,
    user_tx: watch::Sender<Option<AuthUser>>,
    initialized: watch::Sender<bool>,
    pub(crate) last_validation: Mutex<Option<DateTime<Utc>>>,
    pub(crate) validating: std::sync::atomic::AtomicBool,
    pub(crate) error: Mutex<Option<AppError>>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("config", &self.config)
            .field("initialized", &*self.initialized.borrow())
            .finish()
    }
}

impl AuthManager {
    /// Create a manager backed by `provider`.
    pub fn new(config: AuthConfig, provider: Arc<dyn IdentityProvider>) -> Self {
        Self::with_clock(config, provider, Arc::new(SystemClock))
    }

    /// Create a manager with an explicit time source.
    pub fn with_clock(
        config: AuthConfig,
        provider: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (user_tx, _) = watch::channel(None);
        let (initialized, _) = watch::channel(false);
        Self {
            config,
            provider,
            clock,
            state: RwLock::new(AuthSnapshot::default()),
            user_tx,
            initialized,
            last_validation: Mutex::new(None),
            validating: std::sync::atomic::AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    /// Apply an auth state change reported by the identity provider.
    ///
    /// On sign-in the profile and claims are loaded; a missing profile is
    /// created with defaults. On sign-out both are cleared. The manager counts
    /// as initialized after the first call either way, and subscribers see the
    /// new user even when loading fails.
    pub async fn handle_auth_state(&self, user: Option<AuthUser>) -> AppResult<()> {
        let result = match &user {
            Some(user) => {
                info!(uid = %user.uid, "User signed in");
                self.load_user(user).await
            }
            None => {
                info!("User signed out");
                *self.state.write().await = AuthSnapshot::default();
                Ok(())
            }
        };

        self.user_tx.send_replace(user);
        self.initialized.send_replace(true);

        if let Err(err) = &result {
            warn!(error = %err, "Failed to load signed-in user");
            *self.lock_error() = Some(err.clone());
        }
        result
    }

    async fn load_user(&self, user: &AuthUser) -> AppResult<()> {
        {
            let mut state = self.state.write().await;
            *state = AuthSnapshot {
                user: Some(user.clone()),
                ..Default::default()
            };
        }

        let (profile, claims) = tokio::try_join!(
            self.provider.load_profile(&user.uid),
            self.provider.id_token_claims(user),
        )?;

        let profile = match profile {
            Some(profile) => profile,
            None => {
                debug!(uid = %user.uid, "Creating initial profile");
                let initial = UserProfile::initial(user, self.clock.now());
                self.provider.save_profile(&user.uid, &initial).await?;
                initial
            }
        };

        let mut state = self.state.write().await;
        if state.uid() == Some(&user.uid) {
            state.claims = claims;
            state.profile = Some(profile);
        }
        Ok(())
    }

    /// Resolve once the first auth state has been applied.
    pub async fn wait_for_init(&self) {
        let mut rx = self.initialized.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|initialized| *initialized).await;
    }

    /// Whether the first auth state has been applied.
    pub fn is_initialized(&self) -> bool {
        *self.initialized.borrow()
    }

    /// Follow the signed-in user.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.user_tx.subscribe()
    }

    /// Copy of the cached state.
    pub async fn snapshot(&self) -> AuthSnapshot {
        self.state.read().await.clone()
    }

    /// Signed-in user.
    pub async fn user(&self) -> Option<AuthUser> {
        self.state.read().await.user.clone()
    }

    /// Whether a user is signed in.
    pub async fn is_logged_in(&self) -> bool {
        self.state.read().await.is_logged_in()
    }

    /// Id of the signed-in user.
    pub async fn uid(&self) -> Option<IdentityId> {
        self.state.read().await.uid().cloned()
    }

    /// Claims of the signed-in user.
    pub async fn claims(&self) -> Claims {
        self.state.read().await.claims.clone()
    }

    /// Profile document of the signed-in user.
    pub async fn profile(&self) -> Option<UserProfile> {
        self.state.read().await.profile.clone()
    }

    /// Whether every claim in `names` is set.
    pub async fn has_required_claims<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.state.read().await.has_required_claims(names)
    }

    /// Whether the `admin` claim is set.
    pub async fn is_admin(&self) -> bool {
        self.state.read().await.is_admin()
    }

    /// Whether the `premium` claim is set.
    pub async fn is_premium(&self) -> bool {
        self.state.read().await.is_premium()
    }

    /// Merge `patch` into the profile document and save it.
    pub async fn update_profile(&self, patch: Map<String, Value>) -> AppResult<UserProfile> {
        let uid = self.uid().await.ok_or_else(AppError::no_authenticated_user)?;
        let current = match self.profile().await {
            Some(profile) => profile,
            None => self.provider.load_profile(&uid).await?.unwrap_or_default(),
        };

        let merged = current.merged(patch, self.clock.now())?;
        self.store_profile(&uid, merged).await
    }

    /// Overwrite the profile document. `createdAt` is kept when set and
    /// `updatedAt` is stamped.
    pub async fn save_profile(&self, mut profile: UserProfile) -> AppResult<UserProfile> {
        let uid = self.uid().await.ok_or_else(AppError::no_authenticated_user)?;
        let now = self.clock.now();
        profile.created_at.get_or_insert(now);
        profile.updated_at = Some(now);
        self.store_profile(&uid, profile).await
    }

    async fn store_profile(&self, uid: &IdentityId, profile: UserProfile) -> AppResult<UserProfile> {
        self.provider.save_profile(uid, &profile).await?;
        let reloaded = self.provider.load_profile(uid).await?.unwrap_or(profile);

        let mut state = self.state.write().await;
        if state.uid() == Some(uid) {
            state.profile = Some(reloaded.clone());
        }
        debug!(uid = %uid, "Profile saved");
        Ok(reloaded)
    }

    /// Whether a guard validation is in progress.
    pub fn is_validating(&self) -> bool {
        self.validating.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Most recent failure recorded while loading or validating.
    pub fn last_error(&self) -> Option<AppError> {
        self.lock_error().clone()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn lock_error(&self) -> std::sync::MutexGuard<'_, Option<AppError>> {
        self.error.lock().unwrap_or_else(|e| e.into_inner())
    }
}

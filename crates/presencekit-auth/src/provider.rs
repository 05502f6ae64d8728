//! Identity provider seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use presencekit_core::error::AppError;
use presencekit_core::result::AppResult;
use presencekit_core::types::IdentityId;

use crate::user::{AuthUser, Claims, UserProfile};

/// Source of id-token claims and profile documents.
#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Custom claims from the user's current id token.
    async fn id_token_claims(&self, user: &AuthUser) -> AppResult<Claims>;

    /// The profile document at `users/{uid}`, if one exists.
    async fn load_profile(&self, uid: &IdentityId) -> AppResult<Option<UserProfile>>;

    /// Overwrite the profile document at `users/{uid}`.
    async fn save_profile(&self, uid: &IdentityId, profile: &UserProfile) -> AppResult<()>;
}

/// In-process identity provider.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    claims: RwLock<HashMap<IdentityId, Claims>>,
    profiles: RwLock<HashMap<IdentityId, UserProfile>>,
    fail_claims: AtomicU32,
}

impl MemoryIdentityProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the claims issued to `uid`.
    pub async fn set_claims(&self, uid: &IdentityId, claims: Claims) {
        self.claims.write().await.insert(uid.clone(), claims);
    }

    /// Stored profile for `uid`.
    pub async fn profile(&self, uid: &IdentityId) -> Option<UserProfile> {
        self.profiles.read().await.get(uid).cloned()
    }

    /// Make the next `n` claim lookups fail.
    pub fn fail_next_claims(&self, n: u32) {
        self.fail_claims.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn id_token_claims(&self, user: &AuthUser) -> AppResult<Claims> {
        if self
            .fail_claims
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::backend("id token refresh failed"));
        }
        Ok(self
            .claims
            .read()
            .await
            .get(&user.uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_profile(&self, uid: &IdentityId) -> AppResult<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(uid).cloned())
    }

    async fn save_profile(&self, uid: &IdentityId, profile: &UserProfile) -> AppResult<()> {
        self.profiles
            .write()
            .await
            .insert(uid.clone(), profile.clone());
        Ok(())
    }
}

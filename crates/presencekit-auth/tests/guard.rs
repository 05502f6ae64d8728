//! Guard evaluation against the cached auth state.

use std::sync::Arc;

use presencekit_auth::{
    AuthManager, AuthUser, Claims, GuardConfig, GuardOutcome, IdentityProvider,
    MemoryIdentityProvider, UserProfile,
};
use presencekit_core::config::auth::AuthConfig;
use presencekit_core::traits::clock::{Clock, ManualClock};
use presencekit_core::types::IdentityId;

struct Fixture {
    auth: AuthManager,
    provider: Arc<MemoryIdentityProvider>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new() -> Self {
        let provider = Arc::new(MemoryIdentityProvider::new());
        let clock = Arc::new(ManualClock::at_millis(0));
        let auth = AuthManager::with_clock(
            AuthConfig::default(),
            provider.clone(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Self {
            auth,
            provider,
            clock,
        }
    }

    /// Step past the validation throttle window.
    fn tick(&self) {
        self.clock.advance(chrono::Duration::milliseconds(1_001));
    }
}

#[tokio::test]
async fn test_signed_out_user_is_sent_to_login_with_return_path() {
    let fx = Fixture::new();
    fx.auth.handle_auth_state(None).await.unwrap();

    let outcome = fx.auth.require_auth(Some("/settings")).await;

    let GuardOutcome::Redirect(redirect) = outcome else {
        panic!("expected redirect, got {outcome:?}");
    };
    assert_eq!(redirect.to, "/login");
    assert_eq!(redirect.param("returnTo"), Some("/settings"));
}

#[tokio::test]
async fn test_signed_in_user_passes() {
    let fx = Fixture::new();
    fx.auth
        .handle_auth_state(Some(AuthUser::new("U1")))
        .await
        .unwrap();

    assert_eq!(fx.auth.require_auth(None).await, GuardOutcome::Allowed);
}

#[tokio::test]
async fn test_repeat_validation_is_throttled() {
    let fx = Fixture::new();
    fx.auth.handle_auth_state(None).await.unwrap();

    assert!(!fx.auth.require_auth(None).await.is_allowed());
    assert_eq!(fx.auth.require_auth(None).await, GuardOutcome::Throttled);

    fx.tick();
    assert!(!fx.auth.require_auth(None).await.is_allowed());
}

#[tokio::test]
async fn test_missing_claim_redirects() {
    let fx = Fixture::new();
    let uid = IdentityId::new("U1");
    fx.provider
        .set_claims(&uid, Claims::new().with("premium", true))
        .await;
    fx.auth
        .handle_auth_state(Some(AuthUser::new("U1")))
        .await
        .unwrap();

    assert_eq!(fx.auth.require_claims(&["premium"]).await, GuardOutcome::Allowed);

    fx.tick();
    let outcome = fx.auth.require_claims(&["premium", "admin"]).await;
    assert!(matches!(outcome, GuardOutcome::Redirect(ref r) if r.to == "/login"));
}

#[tokio::test]
async fn test_claims_are_reread_from_token() {
    let fx = Fixture::new();
    let uid = IdentityId::new("U1");
    fx.auth
        .handle_auth_state(Some(AuthUser::new("U1")))
        .await
        .unwrap();
    assert!(!fx.auth.is_admin().await);

    fx.provider
        .set_claims(&uid, Claims::new().with("admin", true))
        .await;
    assert_eq!(fx.auth.require_claims(&["admin"]).await, GuardOutcome::Allowed);
}

#[tokio::test]
async fn test_claim_lookup_failure_fails_guard() {
    let fx = Fixture::new();
    fx.auth
        .handle_auth_state(Some(AuthUser::new("U1")))
        .await
        .unwrap();
    fx.provider.fail_next_claims(1);

    assert_eq!(fx.auth.require_claims(&["admin"]).await, GuardOutcome::Failed);
    assert!(fx.auth.last_error().is_some());
    assert!(!fx.auth.is_validating());
}

#[tokio::test]
async fn test_signed_in_user_is_kept_off_guest_pages() {
    let fx = Fixture::new();
    fx.auth.handle_auth_state(None).await.unwrap();
    assert_eq!(fx.auth.require_no_auth().await, GuardOutcome::Allowed);

    fx.tick();
    fx.auth
        .handle_auth_state(Some(AuthUser::new("U1")))
        .await
        .unwrap();
    let outcome = fx.auth.require_no_auth().await;
    assert!(matches!(outcome, GuardOutcome::Redirect(ref r) if r.to == "/dashboard"));
}

#[tokio::test]
async fn test_profile_check_and_custom_predicate() {
    let fx = Fixture::new();
    let uid = IdentityId::new("U1");
    fx.provider
        .save_profile(
            &uid,
            &UserProfile {
                is_profile_complete: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    fx.auth
        .handle_auth_state(Some(AuthUser::new("U1")))
        .await
        .unwrap();

    let onboarding = GuardConfig::new("/onboarding")
        .require_data(|profile| profile.is_some_and(|p| p.is_profile_complete))
        .redirect_param("step", "profile");
    let GuardOutcome::Redirect(redirect) = fx.auth.validate(onboarding).await else {
        panic!("expected redirect");
    };
    assert_eq!(redirect.to, "/onboarding");
    assert_eq!(redirect.param("step"), Some("profile"));
    assert_eq!(redirect.param("returnTo"), None);

    fx.tick();
    let admins_only = GuardConfig::new("/").allow_if(|state| state.is_admin());
    assert!(!fx.auth.validate(admins_only).await.is_allowed());
}

#[tokio::test]
async fn test_guard_waits_for_first_auth_state() {
    let fx = Arc::new(Fixture::new());

    let guard = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move { fx.auth.require_auth(None).await })
    };
    tokio::task::yield_now().await;
    assert!(!guard.is_finished());

    fx.auth
        .handle_auth_state(Some(AuthUser::new("U1")))
        .await
        .unwrap();
    assert_eq!(guard.await.unwrap(), GuardOutcome::Allowed);
}

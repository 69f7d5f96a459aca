//! Integration tests for the session manager against the in-memory backend.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use pocket_catalog_client::AuthPhase;
use pocket_catalog_client::gateway::GatewayError;
use pocket_catalog_core::{Credentials, UserId};
use pocket_catalog_integration_tests::{MemoryBackend, Operation, app, sign_in};

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_rejected_login_clears_loading_and_stays_signed_out() {
    let backend = Arc::new(MemoryBackend::new());
    let state = app(&backend);

    let credentials = Credentials::new("bad@x.com", "wrong").unwrap();
    let err = state.session().login(&credentials).await.unwrap_err();

    assert!(matches!(
        err.gateway(),
        GatewayError::Api { status: 400, message } if message == "Invalid login credentials"
    ));

    let session = state.session().current();
    assert!(!session.is_loading());
    assert!(!session.is_authenticated());
    assert_eq!(session.phase(), AuthPhase::SignedOut);
}

#[tokio::test]
async fn test_login_authenticates_through_notification() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register("ana@example.com", "secret");
    let state = app(&backend);

    let session = sign_in(&state, "ana@example.com", "secret").await;

    assert!(session.is_authenticated());
    assert_eq!(session.user_id(), Some(&user_id));
    assert_eq!(session.email(), Some("ana@example.com"));
    assert_eq!(session.phase(), AuthPhase::SignedIn);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn test_authenticated_matches_user_presence_after_every_settle() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register("ana@example.com", "secret");
    let state = app(&backend);
    let check = |session: &pocket_catalog_client::Session| {
        assert_eq!(session.is_authenticated(), session.user_id().is_some());
        assert_eq!(session.phase().has_user(), session.user_id().is_some());
    };

    check(&state.session().settled().await);

    check(&sign_in(&state, "ana@example.com", "secret").await);

    state.session().logout().await.unwrap();
    let session = state.session().settled().await;
    check(&session);
    assert!(!session.is_authenticated());

    let bad = Credentials::new("ana@example.com", "nope").unwrap();
    assert!(state.session().login(&bad).await.is_err());
    check(&state.session().settled().await);
}

#[tokio::test]
async fn test_login_transport_failure_propagates_unchanged() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register("ana@example.com", "secret");
    backend.fail(Operation::SignIn);
    let state = app(&backend);

    let credentials = Credentials::new("ana@example.com", "secret").unwrap();
    let err = state.session().login(&credentials).await.unwrap_err();

    assert_eq!(err.gateway().status(), Some(503));
    assert!(!state.session().current().is_loading());
}

// =============================================================================
// Sign-up
// =============================================================================

#[tokio::test]
async fn test_signup_signs_in_when_no_confirmation_needed() {
    let backend = Arc::new(MemoryBackend::new());
    let state = app(&backend);

    let credentials = Credentials::new("new@example.com", "secret").unwrap();
    state.session().signup(&credentials).await.unwrap();
    let session = state.session().settled().await;

    assert!(session.is_authenticated());
    assert_eq!(session.email(), Some("new@example.com"));
}

#[tokio::test]
async fn test_signup_pending_confirmation_settles_signed_out() {
    let backend = Arc::new(MemoryBackend::new());
    backend.require_email_confirmation();
    let state = app(&backend);

    let credentials = Credentials::new("new@example.com", "secret").unwrap();
    state.session().signup(&credentials).await.unwrap();
    let session = state.session().settled().await;

    assert!(!session.is_authenticated());
    assert_eq!(session.phase(), AuthPhase::SignedOut);
}

#[tokio::test]
async fn test_duplicate_signup_is_rejected() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register("taken@example.com", "secret");
    let state = app(&backend);

    let credentials = Credentials::new("taken@example.com", "other").unwrap();
    let err = state.session().signup(&credentials).await.unwrap_err();

    assert_eq!(err.gateway().status(), Some(422));
    assert!(!state.session().settled().await.is_authenticated());
}

// =============================================================================
// Logout and passive reconciliation
// =============================================================================

#[tokio::test]
async fn test_logout_completes_on_notification() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register("ana@example.com", "secret");
    let state = app(&backend);
    sign_in(&state, "ana@example.com", "secret").await;

    state.session().logout().await.unwrap();
    let session = state.session().settled().await;

    assert!(!session.is_authenticated());
    assert_eq!(session.phase(), AuthPhase::SignedOut);
}

#[tokio::test]
async fn test_failed_logout_keeps_user_signed_in() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register("ana@example.com", "secret");
    let state = app(&backend);
    sign_in(&state, "ana@example.com", "secret").await;

    backend.fail(Operation::SignOut);
    assert!(state.session().logout().await.is_err());

    let session = state.session().settled().await;
    assert!(session.is_authenticated());
    assert!(!session.is_loading());
}

#[tokio::test]
async fn test_server_side_sign_out_is_reconciled() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register("ana@example.com", "secret");
    let state = app(&backend);
    sign_in(&state, "ana@example.com", "secret").await;

    let mut changes = state.session().subscribe();
    backend.revoke_session();
    let session = changes
        .wait_for(|session| !session.is_authenticated())
        .await
        .unwrap()
        .clone();

    assert_eq!(session.phase(), AuthPhase::SignedOut);
}

#[tokio::test]
async fn test_token_refresh_keeps_or_restores_the_signed_in_user() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register("ana@example.com", "secret");
    let signed_in = app(&backend);
    sign_in(&signed_in, "ana@example.com", "secret").await;

    // A second client that never signed in picks the user up from the refresh.
    let bystander = app(&backend);
    let mut changes = bystander.session().subscribe();
    backend.refresh_session();
    let session = changes
        .wait_for(pocket_catalog_client::Session::is_authenticated)
        .await
        .unwrap()
        .clone();
    assert_eq!(session.user_id(), Some(&user_id));
    assert_eq!(session.phase(), AuthPhase::SignedIn);

    let session = signed_in.session().settled().await;
    assert!(session.is_authenticated());
    assert_eq!(session.user_id(), Some(&user_id));
    assert_eq!(session.email(), Some("ana@example.com"));
}

#[tokio::test]
async fn test_missed_notifications_resync_with_backend_session() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register("ana@example.com", "secret");
    let state = app(&backend);
    sign_in(&state, "ana@example.com", "secret").await;

    // Overflow the notification buffer, then end the session silently. Only
    // re-reading the backend can reveal that the user is gone.
    for _ in 0..40 {
        backend.refresh_session();
    }
    backend.expire_session();

    let mut changes = state.session().subscribe();
    let session = changes
        .wait_for(|session| !session.is_authenticated())
        .await
        .unwrap()
        .clone();
    assert_eq!(session.phase(), AuthPhase::SignedOut);

    // The stale backlog of refreshes does not sign the user back in.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert!(!state.session().current().is_authenticated());
}

// =============================================================================
// Initialize
// =============================================================================

#[tokio::test]
async fn test_initialize_restores_existing_session() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register("ana@example.com", "secret");

    // First client signs in; a second client over the same backend restores it.
    let first = app(&backend);
    sign_in(&first, "ana@example.com", "secret").await;

    let second = app(&backend);
    second.start().await;
    let session = second.session().settled().await;

    assert_eq!(session.user_id(), Some(&user_id));
}

#[tokio::test]
async fn test_initialize_without_session_is_not_an_error() {
    let backend = Arc::new(MemoryBackend::new());
    let state = app(&backend);

    state.session().initialize().await.unwrap();
    assert!(!state.session().current().is_authenticated());
}

#[tokio::test]
async fn test_initialize_failure_is_non_fatal() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register("ana@example.com", "secret");
    backend.fail(Operation::GetSession);
    let state = app(&backend);

    assert!(state.session().initialize().await.is_err());
    let session = state.session().current();
    assert!(!session.is_loading());
    assert!(!session.is_authenticated());

    // Still usable afterwards.
    backend.recover(Operation::GetSession);
    let session = sign_in(&state, "ana@example.com", "secret").await;
    assert_eq!(session.user_id(), Some(&UserId::new("user-1")));
}

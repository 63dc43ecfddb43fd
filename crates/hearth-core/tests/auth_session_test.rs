#![allow(clippy::unwrap_used)]
// `AuthSession` transitions and the token-store contract.

mod common;

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{FakeApi, Outcome, credential};
use hearth_core::{
    AuthEvent, AuthSession, AuthState, Credential, DeviceApi, ErrorKind, FileTokenStore,
    MemoryTokenStore, TokenStore,
};

fn auth(api: &Arc<FakeApi>, tokens: &Arc<MemoryTokenStore>) -> AuthSession {
    let api: Arc<dyn DeviceApi> = api.clone();
    let tokens: Arc<dyn TokenStore> = tokens.clone();
    AuthSession::new(api, tokens)
}

#[tokio::test]
async fn accepted_credential_authenticates() {
    let api = FakeApi::new();
    let tokens = Arc::new(MemoryTokenStore::new());
    let auth = auth(&api, &tokens);
    let state = auth.subscribe_state();

    let event = auth
        .begin(credential(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(event, AuthEvent::Success);
    assert_eq!(*state.borrow(), AuthState::Authenticated);
    assert!(auth.credential().is_some());

    auth.sign_out();
    assert_eq!(auth.state(), AuthState::NoCredential);
    assert!(auth.credential().is_none());
}

#[tokio::test]
async fn revocation_after_success_clears_everything() {
    let api = FakeApi::new();
    let tokens = Arc::new(MemoryTokenStore::with_credential(credential()));
    let auth = auth(&api, &tokens);
    let mut events = auth.events();

    auth.begin(credential(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(auth.revoked(), AuthEvent::Revoked);

    assert_eq!(events.recv().await.unwrap(), AuthEvent::Success);
    assert_eq!(events.recv().await.unwrap(), AuthEvent::Revoked);
    assert_eq!(auth.state(), AuthState::Revoked);
    assert!(auth.credential().is_none());
    assert!(tokens.load().is_none());
}

#[tokio::test]
async fn rejection_emits_failure_and_never_retries() {
    let api = FakeApi::new();
    api.set_validate(Outcome::Rejected);
    let tokens = Arc::new(MemoryTokenStore::with_credential(credential()));
    let auth = auth(&api, &tokens);

    let event = auth
        .begin(credential(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(event, AuthEvent::Failure { .. }));
    assert_eq!(api.validate_calls(), 1);
    assert!(tokens.load().is_none());
}

#[tokio::test]
async fn cancelled_begin_reports_cancelled() {
    let api = FakeApi::new();
    let tokens = Arc::new(MemoryTokenStore::new());
    let auth = auth(&api, &tokens);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = auth.begin(credential(), &cancel).await.unwrap_err();
    assert!(matches!(err, hearth_core::CoreError::Cancelled));
    assert_eq!(auth.state(), AuthState::NoCredential);
    assert_eq!(api.validate_calls(), 0);
}

#[tokio::test]
async fn complete_saves_then_validates() {
    let api = FakeApi::new();
    let issued = credential();
    api.set_exchange(issued.clone());
    let tokens = Arc::new(MemoryTokenStore::new());
    let auth = auth(&api, &tokens);
    let flow = hearth_core::AuthorizationFlow::new(
        &common::config().endpoints.authorize_url,
        common::config().client,
    );

    let redirect = format!("https://localhost/cb?code=abc&state={}", flow.state());
    let event = auth
        .complete(&flow, &redirect, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(event, AuthEvent::Success);
    assert_eq!(tokens.load(), Some(issued));
}

#[tokio::test]
async fn forged_redirect_is_refused_before_exchange() {
    let api = FakeApi::new();
    api.set_exchange(credential());
    let tokens = Arc::new(MemoryTokenStore::new());
    let auth = auth(&api, &tokens);
    let flow = hearth_core::AuthorizationFlow::new(
        &common::config().endpoints.authorize_url,
        common::config().client,
    );

    let err = auth
        .exchange(&flow, "https://localhost/cb?code=abc&state=forged")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthRejected);
    assert!(tokens.load().is_none());
}

// ── TokenStore contract ──────────────────────────────────────────────

fn round_trip(store: &dyn TokenStore) {
    let saved = Credential::new("abc", Utc.timestamp_opt(1_000, 0).unwrap());
    store.save(Some(&saved)).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.expires_at().timestamp(), 1_000);
    assert_eq!(loaded, saved);

    store.save(None).unwrap();
    assert!(store.load().is_none());
    // Clearing twice is fine.
    store.save(None).unwrap();
}

#[test]
fn memory_store_saves_and_clears_both_fields() {
    round_trip(&MemoryTokenStore::new());
}

#[test]
fn file_store_saves_and_clears_both_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path().join("nested").join("token.toml"));
    round_trip(&store);
    assert!(!store.path().exists());
}

#[test]
fn newer_save_replaces_whole_credential() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path().join("token.toml"));
    store
        .save(Some(&Credential::new("first", Utc::now())))
        .unwrap();
    let second = Credential::new("second", Utc::now() + Duration::days(1));
    store.save(Some(&second)).unwrap();
    assert_eq!(store.load(), Some(second));
}

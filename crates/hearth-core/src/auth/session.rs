// ── Auth session ──
//
// Validates credentials, tracks the active one, and reacts to
// revocation. Never retries on its own: after a rejection or revocation
// the consumer must start a fresh authorization flow.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hearth_api::Credential;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::flow::AuthorizationFlow;
use super::store::TokenStore;
use crate::error::CoreError;
use crate::upstream::DeviceApi;

const AUTH_EVENT_CHANNEL_SIZE: usize = 16;

/// Credential lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoCredential,
    Authenticating,
    Authenticated,
    Revoked,
    Expired,
}

/// Outcome notifications, broadcast to any listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Success,
    Failure { reason: String },
    Revoked,
}

pub struct AuthSession {
    api: Arc<dyn DeviceApi>,
    token_store: Arc<dyn TokenStore>,
    state: watch::Sender<AuthState>,
    events: broadcast::Sender<AuthEvent>,
    credential: Mutex<Option<Credential>>,
}

impl AuthSession {
    pub fn new(api: Arc<dyn DeviceApi>, token_store: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(AuthState::NoCredential);
        let (events, _) = broadcast::channel(AUTH_EVENT_CHANNEL_SIZE);
        Self {
            api,
            token_store,
            state,
            events,
            credential: Mutex::new(None),
        }
    }

    // ── Observers ────────────────────────────────────────────────────

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// The validated credential, while authenticated.
    pub fn credential(&self) -> Option<Credential> {
        self.slot().clone()
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.token_store
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Validate `credential` with the server.
    ///
    /// Auth outcomes come back as `Ok(event)`: `Success`, `Failure`
    /// (rejected or expired, token store cleared) or `Revoked` (token
    /// store cleared). `Err` means the server could not be asked; the
    /// stored credential is left alone.
    pub async fn begin(
        &self,
        credential: Credential,
        cancel: &CancellationToken,
    ) -> Result<AuthEvent, CoreError> {
        if credential.is_expired() {
            info!(expired_at = %credential.expires_at(), "credential expired, not validating");
            self.forget(AuthState::Expired);
            return Ok(self.emit(AuthEvent::Failure {
                reason: CoreError::CredentialExpired {
                    expired_at: credential.expires_at(),
                }
                .to_string(),
            }));
        }

        self.state.send_replace(AuthState::Authenticating);
        debug!("validating credential");

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.state.send_replace(AuthState::NoCredential);
                return Err(CoreError::Cancelled);
            }
            result = self.api.validate(&credential) => result,
        };

        match result {
            Ok(()) => {
                *self.slot() = Some(credential);
                self.state.send_replace(AuthState::Authenticated);
                info!("authenticated");
                Ok(self.emit(AuthEvent::Success))
            }
            Err(hearth_api::Error::Revoked) => Ok(self.revoked()),
            Err(hearth_api::Error::Authentication { message }) => Ok(self.rejected(message)),
            Err(e) => {
                warn!(error = %e, "could not validate credential");
                self.state.send_replace(AuthState::NoCredential);
                Err(CoreError::from(e))
            }
        }
    }

    /// Out-of-band revocation. Clears everything and emits `Revoked`.
    pub fn revoked(&self) -> AuthEvent {
        warn!("credential revoked");
        self.forget(AuthState::Revoked);
        self.emit(AuthEvent::Revoked)
    }

    /// The server refused the credential after it was accepted, e.g. on a
    /// dispatched command. Same cleanup as a rejection during `begin`.
    pub fn rejected(&self, reason: impl Into<String>) -> AuthEvent {
        let reason = reason.into();
        warn!(%reason, "credential rejected");
        self.forget(AuthState::NoCredential);
        self.emit(AuthEvent::Failure { reason })
    }

    /// Exchange an authorization code and persist the resulting credential.
    pub async fn exchange(
        &self,
        flow: &AuthorizationFlow,
        input: &str,
    ) -> Result<Credential, CoreError> {
        let code = flow.code_from_input(input)?;
        let credential = self.api.exchange_code(flow.client(), &code).await?;
        self.token_store.save(Some(&credential))?;
        info!(expires_at = %credential.expires_at(), "authorization code exchanged");
        Ok(credential)
    }

    /// Finish an interactive flow: exchange, persist, then validate.
    pub async fn complete(
        &self,
        flow: &AuthorizationFlow,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthEvent, CoreError> {
        let credential = self.exchange(flow, input).await?;
        self.begin(credential, cancel).await
    }

    /// Drop the in-memory credential without touching the token store.
    pub fn sign_out(&self) {
        *self.slot() = None;
        self.state.send_replace(AuthState::NoCredential);
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn slot(&self) -> MutexGuard<'_, Option<Credential>> {
        self.credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the credential everywhere and land in `state`.
    fn forget(&self, state: AuthState) {
        *self.slot() = None;
        if let Err(e) = self.token_store.save(None) {
            warn!(error = %e, "failed to clear token store");
        }
        self.state.send_replace(state);
    }

    fn emit(&self, event: AuthEvent) -> AuthEvent {
        // No listeners is fine.
        let _ = self.events.send(event.clone());
        event
    }
}

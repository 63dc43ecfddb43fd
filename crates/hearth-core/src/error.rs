// ── Core error types ──
//
// Domain-level errors from hearth-core. Consumers branch on `kind()`
// rather than on HTTP details. The `From<hearth_api::Error>` impl
// translates transport-layer errors into domain variants.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use thiserror::Error;

/// Coarse classification a consumer can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Credential rejected or expired; re-authentication required.
    AuthRejected,
    /// Credential revoked out of band; re-authentication required.
    AuthRevoked,
    /// Upstream unreachable. The session keeps its state and retries the feed.
    NetworkUnavailable,
    /// Command failed validation and never left the process.
    CommandRejectedLocally,
    /// Upstream refused or failed a dispatched command.
    CommandFailedRemotely,
    /// Configuration, storage, or internal failure.
    Other,
}

impl ErrorKind {
    /// The consumer must launch a fresh interactive authorization flow.
    pub fn needs_reauth(self) -> bool {
        matches!(self, Self::AuthRejected | Self::AuthRevoked)
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthRejected { message: String },

    #[error("Access revoked -- authorize again")]
    AuthRevoked,

    #[error("Credential expired at {expired_at}")]
    CredentialExpired { expired_at: DateTime<Utc> },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Authorization state mismatch (possible forged redirect)")]
    StateMismatch,

    // ── Connectivity ─────────────────────────────────────────────────
    #[error("Network unavailable: {reason}")]
    NetworkUnavailable { reason: String },

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Command rejected: {reason}")]
    CommandRejected { reason: String },

    #[error("Thermostat not found: {device_id}")]
    ThermostatNotFound { device_id: String },

    #[error("Structure not found: {structure_id}")]
    StructureNotFound { structure_id: String },

    #[error("Command failed: {message}")]
    CommandFailed {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Session ──────────────────────────────────────────────────────
    #[error("Session is not running")]
    SessionClosed,

    #[error("Operation cancelled")]
    Cancelled,

    // ── Upstream (wrapped, not exposed raw) ──────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    // ── Storage & configuration ──────────────────────────────────────
    #[error("Token store error: {message}")]
    TokenStore { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthRejected { .. }
            | Self::CredentialExpired { .. }
            | Self::NotAuthenticated
            | Self::StateMismatch => ErrorKind::AuthRejected,
            Self::AuthRevoked => ErrorKind::AuthRevoked,
            Self::NetworkUnavailable { .. } | Self::Timeout { .. } => ErrorKind::NetworkUnavailable,
            Self::CommandRejected { .. }
            | Self::ThermostatNotFound { .. }
            | Self::StructureNotFound { .. } => ErrorKind::CommandRejectedLocally,
            Self::CommandFailed { .. } => ErrorKind::CommandFailedRemotely,
            Self::SessionClosed
            | Self::Cancelled
            | Self::Api { .. }
            | Self::TokenStore { .. }
            | Self::Config { .. }
            | Self::Internal(_) => ErrorKind::Other,
        }
    }

    /// Translate an upstream failure of a dispatched command.
    ///
    /// Auth and connectivity failures keep their own kinds; everything else
    /// becomes [`CoreError::CommandFailed`].
    pub(crate) fn from_dispatch(err: hearth_api::Error) -> Self {
        match Self::from(err) {
            Self::Api { message, status } => Self::CommandFailed { message, status },
            Self::Internal(message) => Self::CommandFailed {
                message,
                status: None,
            },
            other => other,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hearth_api::Error> for CoreError {
    fn from(err: hearth_api::Error) -> Self {
        use hearth_api::Error as Api;

        match err {
            Api::Authentication { message } | Api::TokenExchange { message } => {
                Self::AuthRejected { message }
            }
            Api::Revoked => Self::AuthRevoked,
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    Self::Timeout { timeout_secs: 0 }
                } else if e.is_connect() || e.is_request() {
                    Self::NetworkUnavailable {
                        reason: e.to_string(),
                    }
                } else {
                    Self::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::InvalidId { id } => Self::CommandRejected {
                reason: format!("invalid resource id {id:?}"),
            },
            Api::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            Api::Tls(reason) => Self::NetworkUnavailable {
                reason: format!("TLS error: {reason}"),
            },
            Api::RateLimited { retry_after_secs } => Self::Api {
                message: format!("Rate limited -- retry after {retry_after_secs}s"),
                status: Some(429),
            },
            Api::Api { status, message } => Self::Api {
                message,
                status: Some(status),
            },
            Api::WebSocketConnect(reason) => Self::NetworkUnavailable {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => Self::NetworkUnavailable {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::Deserialization { message, body: _ } => {
                Self::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use hearth_config::ConfigError;
use hearth_core::{CoreError, ErrorKind};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────

    #[error("Profile '{profile}' is not signed in")]
    #[diagnostic(
        code(hearth::needs_auth),
        help("Run: hearth login --profile {profile}")
    )]
    NeedsAuth { profile: String },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hearth::auth_failed),
        help(
            "The stored credential was rejected or revoked and has been cleared.\n\
             Run: hearth login --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    // ── Connectivity ─────────────────────────────────────────────────

    #[error("Could not reach the thermostat service: {reason}")]
    #[diagnostic(
        code(hearth::network),
        help("Check your network connection. The stored credential was kept.")
    )]
    Network { reason: String },

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(hearth::timeout),
        help("Increase the timeout with --timeout or check service responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Commands ─────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hearth::not_found),
        help("Run: hearth status to see available thermostats")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("Command rejected: {reason}")]
    #[diagnostic(code(hearth::rejected))]
    Rejected { reason: String },

    #[error("Command failed: {message}")]
    #[diagnostic(
        code(hearth::command_failed),
        help("The server did not accept the change; the next update restores its state.")
    )]
    CommandFailed { message: String },

    #[error("The session ended before the command completed")]
    #[diagnostic(code(hearth::session_closed))]
    SessionClosed,

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hearth::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hearth::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: hearth config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(hearth::no_config),
        help(
            "Create one with: hearth config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("No client secret configured for profile '{profile}'")]
    #[diagnostic(
        code(hearth::no_client_secret),
        help(
            "Set HEARTH_CLIENT_SECRET, store it with: hearth config set-secret,\n\
             or add client_secret to the profile."
        )
    )]
    NoClientSecret { profile: String },

    #[error(transparent)]
    #[diagnostic(code(hearth::config))]
    Config(ConfigError),

    // ── Other core failures ──────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(hearth::internal))]
    Core(CoreError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not serialize output: {0}")]
    #[diagnostic(code(hearth::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map a core failure for `profile` to a user-facing error.
    pub fn from_core(err: CoreError, profile: &str) -> Self {
        match err {
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::ThermostatNotFound { device_id } => Self::NotFound {
                resource_type: "thermostat".into(),
                identifier: device_id,
            },
            CoreError::StructureNotFound { structure_id } => Self::NotFound {
                resource_type: "structure".into(),
                identifier: structure_id,
            },
            CoreError::CommandRejected { reason } => Self::Rejected { reason },
            CoreError::SessionClosed | CoreError::Cancelled => Self::SessionClosed,
            err => match err.kind() {
                ErrorKind::AuthRejected | ErrorKind::AuthRevoked => Self::AuthFailed {
                    profile: profile.into(),
                    message: err.to_string(),
                },
                ErrorKind::NetworkUnavailable => Self::Network {
                    reason: err.to_string(),
                },
                ErrorKind::CommandFailedRemotely => Self::CommandFailed {
                    message: err.to_string(),
                },
                ErrorKind::CommandRejectedLocally | ErrorKind::Other => Self::Core(err),
            },
        }
    }

    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NeedsAuth { .. } | Self::AuthFailed { .. } | Self::NoClientSecret { .. } => {
                exit_code::AUTH
            }
            Self::Network { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::NOT_FOUND
            }
            Self::Rejected { .. } | Self::CommandFailed { .. } => exit_code::REJECTED,
            Self::Validation { .. } => exit_code::USAGE,
            Self::SessionClosed
            | Self::Config(_)
            | Self::Core(_)
            | Self::Io(_)
            | Self::Json(_) => exit_code::GENERAL,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoClientSecret { profile } => Self::NoClientSecret { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

//! Device-session layer between `hearth-api` and consumers (CLI / UI).
//!
//! This crate owns the session lifecycle, domain model, and reactive
//! device state for the hearth workspace:
//!
//! - **[`SessionController`]**: Composes the pieces below into one state
//!   machine (unauthenticated → authenticating → live → revoked).
//!   [`start()`](SessionController::start) loads the stored credential,
//!   validates it, and subscribes to the update stream. All transitions of
//!   a running session are serialized through one event queue.
//!
//! - **[`AuthSession`]** / **[`TokenStore`]**: Credential validation,
//!   revocation handling, the interactive [`AuthorizationFlow`], and
//!   persistence. Nothing is retried silently: a rejected or revoked
//!   credential surfaces [`SessionEvent::NeedsAuth`].
//!
//! - **[`UpdateStream`]**: Exactly one handler per session, fed from the
//!   upstream WebSocket feed with reconnect, connectivity signals, and full
//!   resyncs.
//!
//! - **[`CommandDispatcher`]**: Setpoint, mode, and away commands. Each
//!   is validated locally, applied optimistically to the [`DataStore`],
//!   and dispatched without waiting; inbound snapshots stay authoritative.
//!
//! - **[`DataStore`]**: Lock-free reactive storage (`DashMap` +
//!   `tokio::sync::watch`) read through [`EntityStream`] or
//!   [`SnapshotSet`].

pub mod auth;
pub mod command;
pub mod config;
mod convert;
pub mod error;
pub mod model;
mod queue;
pub mod session;
pub mod store;
pub mod stream;
pub mod upstream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::{
    AuthEvent, AuthSession, AuthState, AuthorizationFlow, FileTokenStore, MemoryTokenStore,
    StoredCredential, TOKEN_NAMESPACE, TokenStore,
};
pub use command::{
    Command, CommandDispatcher, CommandField, CommandTicket, DesiredValue, PendingCommand,
};
pub use config::{DEFAULT_PENDING_COMMAND_TIMEOUT, SessionConfig, TlsVerification};
pub use error::{CoreError, ErrorKind};
pub use session::{SessionController, SessionEvent, SessionState};
pub use store::DataStore;
pub use stream::{
    Connectivity, EntityStream, StreamUpdate, SubscriptionHandle, UpdateStream,
};
pub use upstream::{DeviceApi, HttpDeviceApi, Mutation};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AwayState, ControlLayout, DeviceSnapshot, HvacActivity, HvacMode, SnapshotSet, Snapshots,
    StructureSnapshot, ThermostatDisplay,
};

// Upstream types consumers need to build a session.
pub use hearth_api::{Credential, Endpoints, OAuthClient, ReconnectConfig};

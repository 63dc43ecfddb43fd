// hearth-api: Async Rust client for a cloud thermostat API (token exchange, mutations, feed)

pub mod auth;
pub mod client;
pub mod error;
pub mod feed;
pub mod models;
pub mod transport;

pub use auth::{AuthorizationRequest, Credential, OAuthClient};
pub use client::{ApiClient, Endpoints};
pub use error::Error;
pub use feed::{Feed, FeedMessage, ReconnectConfig};
pub use models::{
    SnapshotRecord, StructurePatch, StructureRecord, ThermostatPatch, ThermostatRecord,
    TokenResponse,
};
pub use transport::{TlsMode, TransportConfig};

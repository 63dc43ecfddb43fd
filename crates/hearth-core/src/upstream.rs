// ── Upstream API seam ──
//
// Everything the session needs from the outside world, behind one
// object-safe trait. `HttpDeviceApi` is the real implementation; tests
// and embedders can supply their own.

use async_trait::async_trait;
use hearth_api::{
    ApiClient, Credential, Feed, OAuthClient, ReconnectConfig, StructurePatch, ThermostatPatch,
};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::error::CoreError;

/// A single remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Thermostat {
        device_id: String,
        patch: ThermostatPatch,
    },
    Structure {
        structure_id: String,
        patch: StructurePatch,
    },
}

/// Remote operations a session performs.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Trade an authorization code for a credential.
    async fn exchange_code(
        &self,
        client: &OAuthClient,
        code: &str,
    ) -> Result<Credential, hearth_api::Error>;

    /// Check that a credential is still accepted.
    async fn validate(&self, credential: &Credential) -> Result<(), hearth_api::Error>;

    /// Open the real-time feed. The feed stops when `cancel` fires or the
    /// returned [`Feed`] is dropped.
    async fn open_feed(
        &self,
        credential: &Credential,
        cancel: CancellationToken,
    ) -> Result<Feed, hearth_api::Error>;

    /// Send one mutation.
    async fn dispatch(
        &self,
        credential: &Credential,
        mutation: &Mutation,
    ) -> Result<(), hearth_api::Error>;
}

/// [`DeviceApi`] over HTTP + WebSocket.
pub struct HttpDeviceApi {
    client: ApiClient,
    reconnect: ReconnectConfig,
}

impl HttpDeviceApi {
    pub fn new(config: &SessionConfig) -> Result<Self, CoreError> {
        let client = ApiClient::new(config.endpoints.clone(), &config.transport())?;
        Ok(Self {
            client,
            reconnect: config.reconnect.clone(),
        })
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn exchange_code(
        &self,
        client: &OAuthClient,
        code: &str,
    ) -> Result<Credential, hearth_api::Error> {
        self.client.exchange_code(client, code).await
    }

    async fn validate(&self, credential: &Credential) -> Result<(), hearth_api::Error> {
        self.client.validate(credential).await
    }

    async fn open_feed(
        &self,
        credential: &Credential,
        cancel: CancellationToken,
    ) -> Result<Feed, hearth_api::Error> {
        Ok(self
            .client
            .open_feed(credential, self.reconnect.clone(), cancel))
    }

    async fn dispatch(
        &self,
        credential: &Credential,
        mutation: &Mutation,
    ) -> Result<(), hearth_api::Error> {
        match mutation {
            Mutation::Thermostat { device_id, patch } => {
                self.client
                    .update_thermostat(credential, device_id, patch)
                    .await
            }
            Mutation::Structure {
                structure_id,
                patch,
            } => {
                self.client
                    .update_structure(credential, structure_id, patch)
                    .await
            }
        }
    }
}

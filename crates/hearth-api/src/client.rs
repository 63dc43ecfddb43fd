// Async HTTP client for the thermostat REST API.
//
// Auth: `Authorization: Bearer <token>` per request. The credential is
// passed in by the caller so a single client can outlive token changes.

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue, RETRY_AFTER};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::auth::{AuthorizationRequest, Credential, OAuthClient};
use crate::error::Error;
use crate::feed::{Feed, ReconnectConfig};
use crate::models::{StructurePatch, ThermostatPatch, TokenResponse};
use crate::transport::TransportConfig;

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorResponse {
    fn is_revocation(&self) -> bool {
        matches!(self.error.as_deref(), Some("revoked" | "auth_revoked"))
    }
}

// ── Endpoints ────────────────────────────────────────────────────────

/// The four upstream locations the client talks to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// REST base, e.g. `https://api.example.com/v1/`.
    pub api_base: Url,
    /// Token-exchange base, e.g. `https://auth.example.com/`.
    pub auth_base: Url,
    /// Page the user opens to grant access.
    pub authorize_url: Url,
    /// WebSocket feed, e.g. `wss://stream.example.com/v1/feed`.
    pub stream_url: Url,
}

impl Endpoints {
    pub fn parse(
        api_base: &str,
        auth_base: &str,
        authorize_url: &str,
        stream_url: &str,
    ) -> Result<Self, Error> {
        Ok(Self {
            api_base: with_trailing_slash(Url::parse(api_base)?),
            auth_base: with_trailing_slash(Url::parse(auth_base)?),
            authorize_url: Url::parse(authorize_url)?,
            stream_url: Url::parse(stream_url)?,
        })
    }
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the thermostat API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl ApiClient {
    // ── Constructors ─────────────────────────────────────────────────

    pub fn new(endpoints: Endpoints, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            endpoints,
        })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // ── Authorization ────────────────────────────────────────────────

    /// URL the user opens to start the interactive flow.
    pub fn authorization_request(
        &self,
        client: &OAuthClient,
        state: impl Into<String>,
    ) -> AuthorizationRequest {
        AuthorizationRequest::new(&self.endpoints.authorize_url, client, state)
    }

    /// Trade an authorization code for a credential.
    pub async fn exchange_code(&self, client: &OAuthClient, code: &str) -> Result<Credential, Error> {
        let url = self.endpoints.auth_base.join("oauth2/access_token")?;
        debug!("POST {url}");

        let form = [
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.expose_secret()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];
        let resp = self.http.post(url).form(&form).send().await?;
        let status = resp.status();

        if status.is_success() {
            let token: TokenResponse = decode(resp).await?;
            if token.access_token.is_empty() {
                return Err(Error::TokenExchange {
                    message: "server returned an empty access token".into(),
                });
            }
            return Credential::from_expires_in(token.access_token, token.expires_in, Utc::now());
        }

        match parse_error(status, resp).await {
            Error::Api { message, .. } | Error::Authentication { message }
                if status.is_client_error() =>
            {
                Err(Error::TokenExchange { message })
            }
            other => Err(other),
        }
    }

    /// Check a credential against the server.
    ///
    /// `Ok(())` means the token is live; [`Error::Authentication`] means it was
    /// rejected and [`Error::Revoked`] means it was revoked out of band.
    pub async fn validate(&self, credential: &Credential) -> Result<(), Error> {
        let url = self.url("session")?;
        debug!("GET {url}");

        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, bearer(credential)?)
            .send()
            .await?;
        handle_empty(resp).await
    }

    // ── Mutations ────────────────────────────────────────────────────

    pub async fn update_thermostat(
        &self,
        credential: &Credential,
        device_id: &str,
        patch: &ThermostatPatch,
    ) -> Result<(), Error> {
        let url = self.entity_url("thermostats", device_id)?;
        self.put(credential, url, patch).await
    }

    pub async fn update_structure(
        &self,
        credential: &Credential,
        structure_id: &str,
        patch: &StructurePatch,
    ) -> Result<(), Error> {
        let url = self.entity_url("structures", structure_id)?;
        self.put(credential, url, patch).await
    }

    // ── Feed ─────────────────────────────────────────────────────────

    /// Open the real-time feed for `credential`. See [`Feed::connect`].
    pub fn open_feed(
        &self,
        credential: &Credential,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Feed {
        Feed::connect(
            self.endpoints.stream_url.clone(),
            credential.clone(),
            reconnect,
            cancel,
        )
    }

    // ── HTTP helpers ─────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.endpoints.api_base.join(path)?)
    }

    /// `{api_base}/{collection}/{id}` with `id` escaped as one path segment.
    fn entity_url(&self, collection: &str, id: &str) -> Result<Url, Error> {
        if matches!(id, "" | "." | "..") {
            return Err(Error::InvalidId { id: id.to_owned() });
        }
        let mut url = self.endpoints.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidId { id: id.to_owned() })?
            .pop_if_empty()
            .push(collection)
            .push(id);
        Ok(url)
    }

    async fn put<B: Serialize + Sync>(
        &self,
        credential: &Credential,
        url: Url,
        body: &B,
    ) -> Result<(), Error> {
        debug!("PUT {url}");

        let resp = self
            .http
            .put(url)
            .header(AUTHORIZATION, bearer(credential)?)
            .json(body)
            .send()
            .await?;
        handle_empty(resp).await
    }
}

// ── Response handling ────────────────────────────────────────────────

fn bearer(credential: &Credential) -> Result<HeaderValue, Error> {
    let mut value =
        HeaderValue::from_str(&credential.bearer()).map_err(|e| Error::Authentication {
            message: format!("invalid token header value: {e}"),
        })?;
    value.set_sensitive(true);
    Ok(value)
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body,
        }
    })
}

async fn handle_empty(resp: reqwest::Response) -> Result<(), Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(parse_error(status, resp).await)
    }
}

async fn parse_error(status: StatusCode, resp: reqwest::Response) -> Error {
    let retry_after = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let raw = resp.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<ErrorResponse>(&raw).ok();

    if parsed.as_ref().is_some_and(ErrorResponse::is_revocation) {
        return Error::Revoked;
    }

    let message = parsed
        .and_then(|e| e.message.or(e.error))
        .or_else(|| (!raw.is_empty()).then_some(raw))
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::UNAUTHORIZED => Error::Authentication { message },
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            retry_after_secs: retry_after.unwrap_or(1),
        },
        _ => Error::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_normalize_trailing_slash() {
        let endpoints = Endpoints::parse(
            "https://api.example.com/v1",
            "https://auth.example.com",
            "https://home.example.com/login/oauth2",
            "wss://stream.example.com/v1/feed",
        )
        .unwrap();
        assert_eq!(endpoints.api_base.as_str(), "https://api.example.com/v1/");
        assert_eq!(
            endpoints.api_base.join("session").unwrap().as_str(),
            "https://api.example.com/v1/session"
        );
        assert_eq!(
            endpoints.auth_base.join("oauth2/access_token").unwrap().as_str(),
            "https://auth.example.com/oauth2/access_token"
        );
    }

    #[test]
    fn endpoints_reject_garbage() {
        let err = Endpoints::parse("not a url", "https://a", "https://b", "wss://c").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn revocation_body_detection() {
        let body: ErrorResponse = serde_json::from_str(r#"{"error":"auth_revoked"}"#).unwrap();
        assert!(body.is_revocation());
        let body: ErrorResponse = serde_json::from_str(r#"{"error":"forbidden"}"#).unwrap();
        assert!(!body.is_revocation());
    }
}

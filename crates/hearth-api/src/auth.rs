use std::fmt;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

// ── Credential ───────────────────────────────────────────────────────

/// An issued access token together with its expiry.
///
/// Immutable once issued. A refresh or logout replaces the whole value;
/// there is no way to change one half without the other.
#[derive(Clone)]
pub struct Credential {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_at,
        }
    }

    /// Build a credential from a token-exchange response (`expires_in` seconds
    /// counted from `issued_at`). A lifetime past the representable range is
    /// refused.
    pub fn from_expires_in(
        token: impl Into<String>,
        expires_in_secs: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let expires_at = Duration::try_seconds(expires_in_secs.max(0))
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| Error::TokenExchange {
                message: format!("expires_in out of range: {expires_in_secs}"),
            })?;
        Ok(Self::new(token, expires_at))
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `true` if `expires_at` is at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Value for the `Authorization` header.
    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expires_at == other.expires_at
            && self.token.expose_secret() == other.token.expose_secret()
    }
}

impl Eq for Credential {}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ── OAuth client registration ────────────────────────────────────────

/// Client registration used for the interactive authorization flow.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Where the provider sends the browser after consent. Optional for
    /// PIN-style flows where the user pastes the code back.
    pub redirect_url: Option<Url>,
}

// ── Authorization request ────────────────────────────────────────────

/// The URL a user opens to grant access, plus the anti-forgery `state`
/// the provider echoes back with the code.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

impl AuthorizationRequest {
    /// Build `{authorize_url}?client_id=..&state=..[&redirect_uri=..]`.
    pub fn new(authorize_url: &Url, client: &OAuthClient, state: impl Into<String>) -> Self {
        let state = state.into();
        let mut url = authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &client.client_id);
            query.append_pair("state", &state);
            if let Some(ref redirect) = client.redirect_url {
                query.append_pair("redirect_uri", redirect.as_str());
            }
        }
        Self { url, state }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn client() -> OAuthClient {
        OAuthClient {
            client_id: "hearth-client".into(),
            client_secret: SecretString::from("s3cret".to_string()),
            redirect_url: None,
        }
    }

    #[test]
    fn credential_expiry_boundary() {
        let at = Utc.timestamp_opt(1_000, 0).unwrap();
        let cred = Credential::new("abc", at);
        assert!(!cred.is_expired_at(Utc.timestamp_opt(999, 0).unwrap()));
        assert!(cred.is_expired_at(at));
        assert!(cred.is_expired_at(Utc.timestamp_opt(1_001, 0).unwrap()));
    }

    #[test]
    fn credential_from_expires_in() {
        let issued = Utc.timestamp_opt(1_000, 0).unwrap();
        let cred = Credential::from_expires_in("abc", 3_600, issued).unwrap();
        assert_eq!(cred.expires_at(), Utc.timestamp_opt(4_600, 0).unwrap());
    }

    #[test]
    fn credential_lifetime_out_of_range() {
        let issued = Utc.timestamp_opt(1_000, 0).unwrap();
        for secs in [9_000_000_000_000_000, i64::MAX] {
            let err = Credential::from_expires_in("abc", secs, issued).unwrap_err();
            assert!(matches!(err, Error::TokenExchange { .. }), "got: {err:?}");
        }
    }

    #[test]
    fn credential_debug_redacts_token() {
        let cred = Credential::new("super-secret-token", Utc::now());
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn credential_equality_compares_both_fields() {
        let at = Utc.timestamp_opt(1_000, 0).unwrap();
        assert_eq!(Credential::new("abc", at), Credential::new("abc", at));
        assert_ne!(Credential::new("abc", at), Credential::new("abd", at));
        assert_ne!(
            Credential::new("abc", at),
            Credential::new("abc", Utc.timestamp_opt(1_001, 0).unwrap())
        );
    }

    #[test]
    fn authorization_url_carries_client_and_state() {
        let base = Url::parse("https://home.example.com/login/oauth2").unwrap();
        let request = AuthorizationRequest::new(&base, &client(), "xyz");
        assert_eq!(
            request.url.as_str(),
            "https://home.example.com/login/oauth2?client_id=hearth-client&state=xyz"
        );
        assert_eq!(request.state, "xyz");
    }

    #[test]
    fn authorization_url_includes_redirect_when_set() {
        let base = Url::parse("https://home.example.com/login/oauth2").unwrap();
        let mut client = client();
        client.redirect_url = Some(Url::parse("http://localhost:8765/cb").unwrap());
        let request = AuthorizationRequest::new(&base, &client, "xyz");
        let pairs: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:8765/cb".to_string()
        )));
    }
}

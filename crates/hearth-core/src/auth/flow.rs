use hearth_api::{AuthorizationRequest, OAuthClient};
use url::Url;
use uuid::Uuid;

use crate::error::CoreError;

/// One interactive authorization attempt.
///
/// Carries the URL the user opens and the anti-forgery `state` that must
/// come back with the code.
#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    request: AuthorizationRequest,
    client: OAuthClient,
}

impl AuthorizationFlow {
    pub fn new(authorize_url: &Url, client: OAuthClient) -> Self {
        let state = Uuid::new_v4().simple().to_string();
        let request = AuthorizationRequest::new(authorize_url, &client, state);
        Self { request, client }
    }

    pub fn url(&self) -> &Url {
        &self.request.url
    }

    pub fn state(&self) -> &str {
        &self.request.state
    }

    pub fn client(&self) -> &OAuthClient {
        &self.client
    }

    /// Extract the authorization code from what the user pasted back.
    ///
    /// Accepts either a bare code (PIN-style flow) or the full redirect URL.
    /// A redirect URL must carry this flow's `state`.
    pub fn code_from_input(&self, input: &str) -> Result<String, CoreError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(CoreError::AuthRejected {
                message: "empty authorization code".into(),
            });
        }

        let Some(url) = Url::parse(input)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
        else {
            return Ok(input.to_owned());
        };

        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => {
                    return Err(CoreError::AuthRejected {
                        message: format!("authorization denied: {value}"),
                    });
                }
                _ => {}
            }
        }

        if state.as_deref() != Some(self.state()) {
            return Err(CoreError::StateMismatch);
        }
        code.filter(|c| !c.is_empty())
            .ok_or_else(|| CoreError::AuthRejected {
                message: "redirect URL has no authorization code".into(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn flow() -> AuthorizationFlow {
        let client = OAuthClient {
            client_id: "hearth".into(),
            client_secret: SecretString::from("s".to_string()),
            redirect_url: Some(Url::parse("http://localhost:8765/callback").unwrap()),
        };
        AuthorizationFlow::new(
            &Url::parse("https://home.example.com/login/oauth2").unwrap(),
            client,
        )
    }

    #[test]
    fn each_flow_gets_a_fresh_state() {
        let a = flow();
        let b = flow();
        assert_ne!(a.state(), b.state());
        assert!(a.url().as_str().contains(&format!("state={}", a.state())));
    }

    #[test]
    fn bare_code_is_accepted() {
        assert_eq!(flow().code_from_input("  PIN1234\n").unwrap(), "PIN1234");
    }

    #[test]
    fn redirect_url_with_matching_state() {
        let flow = flow();
        let input = format!(
            "http://localhost:8765/callback?code=abc&state={}",
            flow.state()
        );
        assert_eq!(flow.code_from_input(&input).unwrap(), "abc");
    }

    #[test]
    fn redirect_url_with_wrong_state_is_rejected() {
        let err = flow()
            .code_from_input("http://localhost:8765/callback?code=abc&state=forged")
            .unwrap_err();
        assert!(matches!(err, CoreError::StateMismatch));
    }

    #[test]
    fn denied_and_empty_inputs() {
        let flow = flow();
        let denied = format!(
            "http://localhost:8765/callback?error=access_denied&state={}",
            flow.state()
        );
        assert!(matches!(
            flow.code_from_input(&denied),
            Err(CoreError::AuthRejected { .. })
        ));
        assert!(flow.code_from_input("   ").is_err());
    }
}

// ── Runtime session configuration ──
//
// These types describe *where* the upstream lives and how to talk to it.
// They carry the client registration, but never touch disk.
// The CLI (or an embedder) constructs a `SessionConfig` and hands it in.

use std::time::Duration;

use hearth_api::{Endpoints, OAuthClient, ReconnectConfig, TlsMode, TransportConfig};

/// Default time a pending command waits for a reflecting snapshot.
pub const DEFAULT_PENDING_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// Bundled webpki roots (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification. Only for local test servers.
    DangerAcceptInvalid,
}

/// Configuration for a single device session.
///
/// Built by the CLI, passed to `SessionController` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST, token, authorize and feed locations.
    pub endpoints: Endpoints,
    /// OAuth client registration for the interactive flow.
    pub client: OAuthClient,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How long a dispatched command stays pending without a reflecting snapshot.
    pub pending_command_timeout: Duration,
    /// Feed reconnection backoff.
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub fn new(endpoints: Endpoints, client: OAuthClient) -> Self {
        Self {
            endpoints,
            client,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            pending_command_timeout: DEFAULT_PENDING_COMMAND_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use secrecy::SecretString;

    use super::*;

    pub(crate) fn test_config() -> SessionConfig {
        let endpoints = Endpoints::parse(
            "http://127.0.0.1:9/v1",
            "http://127.0.0.1:9",
            "http://127.0.0.1:9/login/oauth2",
            "ws://127.0.0.1:9/feed",
        )
        .unwrap();
        let client = OAuthClient {
            client_id: "hearth-test".into(),
            client_secret: SecretString::from("secret".to_string()),
            redirect_url: None,
        };
        SessionConfig::new(endpoints, client)
    }

    #[test]
    fn defaults_are_strict_tls_and_thirty_second_pending_window() {
        let config = test_config();
        assert_eq!(config.tls, TlsVerification::SystemDefaults);
        assert_eq!(config.pending_command_timeout, Duration::from_secs(30));
        assert!(matches!(config.transport().tls, TlsMode::System));
    }
}

//! Shared configuration for the hearth CLI and other embedders.
//!
//! TOML profiles, client-secret resolution (env + keyring + plaintext),
//! token-store selection, and translation to `hearth_core::SessionConfig`.
//! The CLI layers its flag overrides on top.

mod token_store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hearth_core::{Endpoints, OAuthClient, SessionConfig, TlsVerification};

pub use token_store::{KeyringTokenStore, open_token_store, token_file_path};

/// Keyring service name and config directory name.
pub const APP_NAME: &str = "hearth";

/// Environment variable checked first for the client secret.
pub const CLIENT_SECRET_ENV: &str = "HEARTH_CLIENT_SECRET";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("no client secret configured for profile '{profile}'")]
    NoClientSecret { profile: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is given on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named upstream profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// `requested`, else the configured default, else `"default"`.
    pub fn profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Per-request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Pending-command window, seconds.
    #[serde(default = "default_pending_timeout")]
    pub pending_timeout: u64,

    #[serde(default)]
    pub token_store: TokenStoreKind,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            pending_timeout: default_pending_timeout(),
            token_store: TokenStoreKind::default(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_pending_timeout() -> u64 {
    hearth_core::DEFAULT_PENDING_COMMAND_TIMEOUT.as_secs()
}

/// Where the session credential is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    /// TOML file in the platform data directory.
    #[default]
    File,
    /// System keyring.
    Keyring,
}

/// A named upstream profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// REST base URL (e.g., "https://api.example.com/v1").
    pub api_url: String,

    /// Token-exchange base URL.
    pub auth_url: String,

    /// Page the user opens to grant access.
    pub authorize_url: String,

    /// WebSocket feed URL.
    pub stream_url: String,

    /// OAuth client id.
    pub client_id: String,

    /// OAuth client secret (plaintext -- prefer keyring or env var).
    pub client_secret: Option<String>,

    /// Environment variable name containing the client secret.
    pub client_secret_env: Option<String>,

    /// OAuth redirect URL. Omit for PIN-style flows.
    pub redirect_url: Option<String>,

    /// Override where the credential is stored.
    pub token_store: Option<TokenStoreKind>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Override pending-command window.
    pub pending_timeout: Option<u64>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("rs", APP_NAME, APP_NAME)
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push(APP_NAME);
    p
}

/// Resolve the config file path via XDG / platform conventions.
/// `HEARTH_CONFIG` overrides it.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("HEARTH_CONFIG") {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory for persisted session state (token files).
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(dirs_fallback, |dirs| dirs.data_dir().to_path_buf())
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then the TOML file at `path`, then `HEARTH_*` variables
/// (`__` separates nesting, e.g. `HEARTH_DEFAULTS__TIMEOUT`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HEARTH_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secret resolution ───────────────────────────────────────────────

fn secret_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(APP_NAME, &format!("{profile_name}/client-secret"))
}

/// Resolve the OAuth client secret: env var, then keyring, then plaintext.
pub fn resolve_client_secret(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's client_secret_env, else the global variable
    let env_name = profile
        .client_secret_env
        .as_deref()
        .unwrap_or(CLIENT_SECRET_ENV);
    if let Ok(val) = std::env::var(env_name) {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(secret) = secret_entry(profile_name).and_then(|entry| entry.get_password()) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref secret) = profile.client_secret {
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoClientSecret {
        profile: profile_name.into(),
    })
}

/// Store the client secret in the system keyring.
pub fn store_client_secret(profile_name: &str, secret: &str) -> Result<(), ConfigError> {
    secret_entry(profile_name)
        .and_then(|entry| entry.set_password(secret))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── SessionConfig translation ───────────────────────────────────────

fn parse_url(field: &str, value: &str) -> Result<url::Url, ConfigError> {
    value.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {value}"),
    })
}

/// Build a `SessionConfig` from a profile, with `defaults` filling gaps.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    // Validate each field separately so the error names the culprit.
    parse_url("api_url", &profile.api_url)?;
    parse_url("auth_url", &profile.auth_url)?;
    parse_url("authorize_url", &profile.authorize_url)?;
    parse_url("stream_url", &profile.stream_url)?;
    let endpoints = Endpoints::parse(
        &profile.api_url,
        &profile.auth_url,
        &profile.authorize_url,
        &profile.stream_url,
    )
    .map_err(|e| ConfigError::Validation {
        field: "endpoints".into(),
        reason: e.to_string(),
    })?;

    if profile.client_id.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "client_id".into(),
            reason: "must not be empty".into(),
        });
    }
    let redirect_url = profile
        .redirect_url
        .as_deref()
        .map(|url| parse_url("redirect_url", url))
        .transpose()?;

    let client = OAuthClient {
        client_id: profile.client_id.clone(),
        client_secret: resolve_client_secret(profile, profile_name)?,
        redirect_url,
    };

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = SessionConfig::new(endpoints, client);
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.pending_command_timeout =
        Duration::from_secs(profile.pending_timeout.unwrap_or(defaults.pending_timeout));
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
timeout = 10

[profiles.home]
api_url = "https://api.example.com/v1"
auth_url = "https://auth.example.com"
authorize_url = "https://auth.example.com/login/oauth2"
stream_url = "wss://stream.example.com/v1/feed"
client_id = "hearth-cli"
client_secret = "plain"
client_secret_env = "HEARTH_TEST_SECRET_UNSET"
token_store = "keyring"
pending_timeout = 45
"#;

    fn sample() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        load_config_from(&path).unwrap()
    }

    #[test]
    fn file_values_layer_over_defaults() {
        let config = sample();
        assert_eq!(config.profile_name(None), "home");
        assert_eq!(config.profile_name(Some("work")), "work");
        assert_eq!(config.defaults.timeout, 10);
        assert_eq!(config.defaults.output, "table");
        assert_eq!(config.defaults.token_store, TokenStoreKind::File);

        let profile = config.profile("home").unwrap();
        assert_eq!(profile.token_store, Some(TokenStoreKind::Keyring));
        assert!(matches!(
            config.profile("work"),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn profile_translates_to_session_config() {
        let config = sample();
        let profile = config.profile("home").unwrap();
        let session = profile_to_session_config(profile, "home", &config.defaults).unwrap();

        assert_eq!(session.endpoints.api_base.as_str(), "https://api.example.com/v1/");
        assert_eq!(session.client.client_id, "hearth-cli");
        assert_eq!(session.client.client_secret.expose_secret(), "plain");
        assert_eq!(session.timeout, Duration::from_secs(10));
        assert_eq!(session.pending_command_timeout, Duration::from_secs(45));
        assert_eq!(session.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn bad_url_names_the_field() {
        let config = sample();
        let mut profile = config.profile("home").unwrap().clone();
        profile.stream_url = "not a url".into();

        let err = profile_to_session_config(&profile, "home", &config.defaults).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "stream_url"));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = sample();
        config.defaults.color = "never".into();

        save_config_to(&config, &path).unwrap();
        let reloaded = load_config_from(&path).unwrap();
        assert_eq!(reloaded.defaults.color, "never");
        assert_eq!(reloaded.profiles.len(), 1);
    }
}

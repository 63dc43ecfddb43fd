// ── Credential storage backends ──
//
// The keyring backend keeps token and expiry in one entry as a single
// JSON value, so the two halves can never be observed separately.

use std::path::PathBuf;
use std::sync::Arc;

use hearth_core::{
    CoreError, Credential, FileTokenStore, StoredCredential, TOKEN_NAMESPACE, TokenStore,
};
use tracing::{debug, warn};

use crate::{APP_NAME, Defaults, Profile, TokenStoreKind, data_dir};

/// System-keyring store, one entry per profile.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    user: String,
}

impl KeyringTokenStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            user: format!("{profile_name}/{TOKEN_NAMESPACE}"),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, CoreError> {
        keyring::Entry::new(APP_NAME, &self.user).map_err(|e| CoreError::TokenStore {
            message: format!("keyring unavailable: {e}"),
        })
    }
}

impl TokenStore for KeyringTokenStore {
    fn save(&self, credential: Option<&Credential>) -> Result<(), CoreError> {
        let entry = self.entry()?;
        let Some(credential) = credential else {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(CoreError::TokenStore {
                    message: format!("failed to clear keyring entry: {e}"),
                }),
            };
        };

        let value = serde_json::to_string(&StoredCredential::from_credential(credential))
            .map_err(|e| CoreError::TokenStore {
                message: format!("failed to serialize credential: {e}"),
            })?;
        entry
            .set_password(&value)
            .map_err(|e| CoreError::TokenStore {
                message: format!("failed to write keyring entry: {e}"),
            })
    }

    fn load(&self) -> Option<Credential> {
        let raw = match self.entry().ok()?.get_password() {
            Ok(raw) => raw,
            Err(keyring::Error::NoEntry) => return None,
            Err(e) => {
                warn!(user = %self.user, error = %e, "unreadable keyring entry");
                return None;
            }
        };
        match serde_json::from_str::<StoredCredential>(&raw) {
            Ok(stored) => stored.into_credential(),
            Err(e) => {
                warn!(user = %self.user, error = %e, "malformed keyring entry");
                None
            }
        }
    }
}

/// Token file for `profile_name` under the data directory.
pub fn token_file_path(profile_name: &str) -> PathBuf {
    data_dir()
        .join("tokens")
        .join(format!("{profile_name}.toml"))
}

/// The token store a profile asks for.
pub fn open_token_store(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Arc<dyn TokenStore> {
    match profile.token_store.unwrap_or(defaults.token_store) {
        TokenStoreKind::File => {
            let path = token_file_path(profile_name);
            debug!(path = %path.display(), "using file token store");
            Arc::new(FileTokenStore::new(path))
        }
        TokenStoreKind::Keyring => {
            debug!(profile = profile_name, "using keyring token store");
            Arc::new(KeyringTokenStore::new(profile_name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_files_are_per_profile() {
        let home = token_file_path("home");
        let work = token_file_path("work");
        assert_ne!(home, work);
        assert!(home.ends_with("tokens/home.toml"));
    }

    #[test]
    fn keyring_entry_is_namespaced() {
        assert_eq!(KeyringTokenStore::new("home").user, "home/hearth-token");
    }
}

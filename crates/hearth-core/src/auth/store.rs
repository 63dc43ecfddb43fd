use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use hearth_api::Credential;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;

/// Fixed key the credential is stored under (TOML table, keyring entry).
pub const TOKEN_NAMESPACE: &str = "hearth-token";

/// Storage abstraction for the persisted credential.
///
/// `save` writes token and expiry together or not at all. `load` fails
/// closed: anything missing, unreadable, or malformed reads as "no
/// credential".
pub trait TokenStore: Send + Sync {
    /// Persist `credential`, or clear the stored one when `None`.
    fn save(&self, credential: Option<&Credential>) -> Result<(), CoreError>;

    fn load(&self) -> Option<Credential>;
}

// ── Serialized form ──────────────────────────────────────────────────

/// On-disk / in-keyring shape of a credential.
///
/// Both fields are optional so a half-written record is detectable and
/// rejected instead of failing to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredCredential {
    pub fn from_credential(credential: &Credential) -> Self {
        Self {
            token: Some(credential.token().expose_secret().to_owned()),
            expires_at: Some(credential.expires_at()),
        }
    }

    /// `None` unless both halves are present.
    pub fn into_credential(self) -> Option<Credential> {
        match (self.token, self.expires_at) {
            (Some(token), Some(expires_at)) if !token.is_empty() => {
                Some(Credential::new(token, expires_at))
            }
            _ => None,
        }
    }
}

// ── MemoryTokenStore ─────────────────────────────────────────────────

/// Process-local store for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    credential: Mutex<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, credential: Option<&Credential>) -> Result<(), CoreError> {
        *self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = credential.cloned();
        Ok(())
    }

    fn load(&self) -> Option<Credential> {
        self.credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ── FileTokenStore ───────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    version: u32,
    #[serde(rename = "hearth-token", default)]
    credential: StoredCredential,
}

/// File-backed store: a small TOML file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, contents: &str) -> std::io::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, credential: Option<&Credential>) -> Result<(), CoreError> {
        let Some(credential) = credential else {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CoreError::TokenStore {
                    message: format!("failed to remove {}: {e}", self.path.display()),
                }),
            };
        };

        let file = TokenFile {
            version: 1,
            credential: StoredCredential::from_credential(credential),
        };
        let serialized = toml::to_string(&file).map_err(|e| CoreError::TokenStore {
            message: format!("failed to serialize credential: {e}"),
        })?;
        self.write_atomic(&serialized)
            .map_err(|e| CoreError::TokenStore {
                message: format!("failed to write {}: {e}", self.path.display()),
            })
    }

    fn load(&self) -> Option<Credential> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable token file");
                return None;
            }
        };
        match toml::from_str::<TokenFile>(&raw) {
            Ok(file) => file.credential.into_credential(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed token file");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn cred() -> Credential {
        Credential::new("abc", Utc.timestamp_opt(1_000, 0).unwrap())
    }

    fn temp_store() -> (TempDir, FileTokenStore) {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("token.toml"));
        (dir, store)
    }

    #[test]
    fn memory_round_trip_and_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.load().is_none());
        store.save(Some(&cred())).unwrap();
        assert_eq!(store.load(), Some(cred()));
        store.save(None).unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn file_round_trip_and_clear() {
        let (_dir, store) = temp_store();
        store.save(Some(&cred())).unwrap();
        assert_eq!(store.load(), Some(cred()));

        store.save(None).unwrap();
        assert!(store.load().is_none());
        assert!(!store.path().exists());
        // Clearing twice is fine.
        store.save(None).unwrap();
    }

    #[test]
    fn file_with_only_one_field_loads_as_none() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "version = 1\n[hearth-token]\ntoken = \"abc\"\n").unwrap();
        assert!(store.load().is_none());

        fs::write(
            store.path(),
            "version = 1\n[hearth-token]\nexpires_at = \"1970-01-01T00:16:40Z\"\n",
        )
        .unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn garbage_file_loads_as_none() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "this is = = not toml").unwrap();
        assert!(store.load().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = temp_store();
        store.save(Some(&cred())).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn stored_credential_requires_both_halves() {
        let full = StoredCredential::from_credential(&cred());
        assert_eq!(full.clone().into_credential(), Some(cred()));

        let no_expiry = StoredCredential {
            expires_at: None,
            ..full.clone()
        };
        assert!(no_expiry.into_credential().is_none());

        let empty_token = StoredCredential {
            token: Some(String::new()),
            ..full
        };
        assert!(empty_token.into_credential().is_none());
    }
}

//! Shared helpers for command handlers: profile resolution, session
//! setup, and thermostat lookup.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use hearth_config::{Config, Profile};
use hearth_core::{
    DeviceSnapshot, SessionController, SessionEvent, SessionState, SnapshotSet, StructureSnapshot,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// A constructed (not yet started) session and the profile it belongs to.
pub struct Session {
    pub controller: SessionController,
    pub profile: String,
}

impl Session {
    pub fn core_err(&self, err: hearth_core::CoreError) -> CliError {
        CliError::from_core(err, &self.profile)
    }
}

/// Look up the active profile, applying command-line overrides.
pub fn resolve_profile(global: &GlobalOpts) -> Result<(Config, String, Profile), CliError> {
    let path = hearth_config::config_path();
    let cfg = hearth_config::load_config_from(&path)?;
    let name = cfg.profile_name(global.profile.as_deref());

    let Ok(profile) = cfg.profile(&name) else {
        if cfg.profiles.is_empty() && !path.exists() {
            return Err(CliError::NoConfig {
                path: path.display().to_string(),
            });
        }
        let available = cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ");
        return Err(CliError::ProfileNotFound {
            name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available
            },
        });
    };

    let mut profile = profile.clone();
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    Ok((cfg, name, profile))
}

/// Build the session for the active profile without touching the network.
pub fn open_session(global: &GlobalOpts) -> Result<Session, CliError> {
    let (cfg, name, profile) = resolve_profile(global)?;
    let config = hearth_config::profile_to_session_config(&profile, &name, &cfg.defaults)?;
    let tokens = hearth_config::open_token_store(&profile, &name, &cfg.defaults);
    let controller =
        SessionController::new(config, tokens).map_err(|e| CliError::from_core(e, &name))?;
    debug!(profile = %name, "session constructed");
    Ok(Session {
        controller,
        profile: name,
    })
}

/// Start the session and wait for the first full state.
pub async fn connect(global: &GlobalOpts) -> Result<(Session, SnapshotSet), CliError> {
    let session = open_session(global)?;
    let mut events = session.controller.events();

    let state = session
        .controller
        .start()
        .await
        .map_err(|e| session.core_err(e))?;
    if !state.is_running() {
        return Err(not_running(&session, state, &mut events));
    }

    let timeout = session.controller.config().timeout;
    let ready = tokio::time::timeout(timeout, wait_ready(&session, &mut events))
        .await
        .map_err(|_| CliError::Timeout {
            seconds: timeout.as_secs(),
        });
    match ready {
        Ok(Ok(snapshot)) => Ok((session, snapshot)),
        Ok(Err(e)) | Err(e) => {
            session.controller.shutdown().await;
            Err(e)
        }
    }
}

/// Why `start()` did not go live, from the events it left behind.
fn not_running(
    session: &Session,
    state: SessionState,
    events: &mut broadcast::Receiver<SessionEvent>,
) -> CliError {
    let mut failed = state == SessionState::Revoked;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Error(kind) = event {
            failed |= kind.needs_reauth();
        }
    }
    if failed {
        CliError::AuthFailed {
            profile: session.profile.clone(),
            message: if state == SessionState::Revoked {
                "access was revoked".into()
            } else {
                "the stored credential was rejected".into()
            },
        }
    } else {
        CliError::NeedsAuth {
            profile: session.profile.clone(),
        }
    }
}

async fn wait_ready(
    session: &Session,
    events: &mut broadcast::Receiver<SessionEvent>,
) -> Result<SnapshotSet, CliError> {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Ready(snapshot)) => return Ok(snapshot),
            Ok(SessionEvent::Error(kind)) if kind.needs_reauth() => {
                return Err(CliError::AuthFailed {
                    profile: session.profile.clone(),
                    message: kind.to_string(),
                });
            }
            Ok(SessionEvent::NeedsAuth) => {
                return Err(CliError::NeedsAuth {
                    profile: session.profile.clone(),
                });
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return Err(CliError::SessionClosed),
        }
    }
}

// ── Lookups ──────────────────────────────────────────────────────────

/// Resolve a thermostat by id or (case-insensitive) name; the first
/// thermostat when `identifier` is `None`.
pub fn resolve_thermostat(
    snapshot: &SnapshotSet,
    identifier: Option<&str>,
) -> Result<Arc<DeviceSnapshot>, CliError> {
    let found = match identifier {
        Some(ident) => snapshot
            .thermostats
            .iter()
            .find(|t| t.device_id == ident || t.label().eq_ignore_ascii_case(ident)),
        None => snapshot.thermostats.first(),
    };
    found.cloned().ok_or_else(|| CliError::NotFound {
        resource_type: "thermostat".into(),
        identifier: identifier.unwrap_or("(any)").into(),
    })
}

/// Resolve a structure by id or name; the first thermostat's structure
/// (or the first structure) when `identifier` is `None`.
pub fn resolve_structure(
    snapshot: &SnapshotSet,
    identifier: Option<&str>,
) -> Result<Arc<StructureSnapshot>, CliError> {
    let found = match identifier {
        Some(ident) => snapshot
            .structures
            .iter()
            .find(|s| s.structure_id == ident || s.name.eq_ignore_ascii_case(ident)),
        None => snapshot
            .primary()
            .and_then(|(_, structure)| structure)
            .or_else(|| snapshot.structures.first()),
    };
    found.cloned().ok_or_else(|| CliError::NotFound {
        resource_type: "structure".into(),
        identifier: identifier.unwrap_or("(any)").into(),
    })
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hearth_core::{AwayState, HvacMode};

    use super::*;

    fn device(id: &str, name: &str) -> Arc<DeviceSnapshot> {
        Arc::new(DeviceSnapshot {
            device_id: id.into(),
            name: Some(name.into()),
            structure_id: Some("s-1".into()),
            hvac_mode: HvacMode::Heat,
            ambient_temp_f: 68,
            target_temp_f: 70,
            target_low_f: 64,
            target_high_f: 76,
            revision: None,
        })
    }

    fn snapshot() -> SnapshotSet {
        SnapshotSet {
            thermostats: Arc::new(vec![device("t-1", "Hallway"), device("t-2", "Upstairs")]),
            structures: Arc::new(vec![Arc::new(StructureSnapshot {
                structure_id: "s-1".into(),
                name: "Home".into(),
                away: AwayState::Home,
                thermostat_ids: vec!["t-1".into(), "t-2".into()],
                revision: None,
            })]),
        }
    }

    #[test]
    fn thermostat_by_id_name_or_default() {
        let snap = snapshot();
        assert_eq!(resolve_thermostat(&snap, Some("t-2")).unwrap().device_id, "t-2");
        assert_eq!(
            resolve_thermostat(&snap, Some("upstairs")).unwrap().device_id,
            "t-2"
        );
        assert_eq!(resolve_thermostat(&snap, None).unwrap().device_id, "t-1");
        assert!(matches!(
            resolve_thermostat(&snap, Some("attic")),
            Err(CliError::NotFound { .. })
        ));
    }

    #[test]
    fn structure_defaults_to_primary_thermostats_home() {
        let snap = snapshot();
        assert_eq!(resolve_structure(&snap, None).unwrap().structure_id, "s-1");
        assert_eq!(resolve_structure(&snap, Some("home")).unwrap().name, "Home");
        assert!(resolve_structure(&SnapshotSet::default(), None).is_err());
    }
}

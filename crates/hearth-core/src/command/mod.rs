// ── Command API ──
//
// Typed mutations against thermostats and structures. Commands are
// queued to the session processor, validated against the DataStore,
// applied optimistically, and dispatched without waiting for the ack.

mod dispatcher;
mod pending;
mod plan;
mod step;

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::model::{AwayState, HvacMode};

pub use dispatcher::{CommandDispatcher, CommandTicket};
pub use pending::PendingCommand;
pub(crate) use pending::PendingCommands;
pub(crate) use plan::{apply_optimistic, plan};

/// A mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetTargetTemperature { device_id: String, value_f: i32 },
    SetTemperatureRange { device_id: String, low_f: i32, high_f: i32 },
    SetHvacMode { device_id: String, mode: HvacMode },
    SetAway { structure_id: String, away: AwayState },
}

impl Command {
    /// Id of the thermostat or structure the command targets.
    pub fn target(&self) -> &str {
        match self {
            Self::SetTargetTemperature { device_id, .. }
            | Self::SetTemperatureRange { device_id, .. }
            | Self::SetHvacMode { device_id, .. } => device_id,
            Self::SetAway { structure_id, .. } => structure_id,
        }
    }
}

/// Which field of an entity a pending command expects to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandField {
    TargetTemperature,
    TargetLow,
    TargetHigh,
    HvacMode,
    Away,
}

/// The value a pending command waits to see reflected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DesiredValue {
    Temperature(i32),
    Mode(HvacMode),
    Away(AwayState),
}

impl std::fmt::Display for DesiredValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature(value) => write!(f, "{value}°F"),
            Self::Mode(mode) => write!(f, "{mode}"),
            Self::Away(away) => write!(f, "{away}"),
        }
    }
}

/// Internal envelope sent through the session queue.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<Result<(), CoreError>>,
}

// ── Command planning ──
//
// Local validation, the optimistic write, and the wire mutation for a
// command. Nothing here touches the network.

use hearth_api::{StructurePatch, ThermostatPatch};

use super::{Command, CommandField, DesiredValue};
use crate::error::CoreError;
use crate::model::HvacMode;
use crate::store::DataStore;
use crate::upstream::Mutation;

/// A validated command, ready to apply and dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Plan {
    pub mutation: Mutation,
    pub expected: Vec<(CommandField, DesiredValue)>,
}

/// Validate `command` against the current store contents.
pub(crate) fn plan(store: &DataStore, command: &Command) -> Result<Plan, CoreError> {
    match command {
        Command::SetTargetTemperature { device_id, value_f } => {
            require_thermostat(store, device_id)?;
            Ok(Plan {
                mutation: Mutation::Thermostat {
                    device_id: device_id.clone(),
                    patch: ThermostatPatch {
                        target_temperature_f: Some(*value_f),
                        ..ThermostatPatch::default()
                    },
                },
                expected: vec![(
                    CommandField::TargetTemperature,
                    DesiredValue::Temperature(*value_f),
                )],
            })
        }
        Command::SetTemperatureRange {
            device_id,
            low_f,
            high_f,
        } => {
            let mode = require_thermostat(store, device_id)?;
            if mode == HvacMode::Off {
                return Err(CoreError::CommandRejected {
                    reason: "cannot set a temperature range while HVAC mode is off".into(),
                });
            }
            if low_f > high_f {
                return Err(CoreError::CommandRejected {
                    reason: format!("low setpoint {low_f}°F is above high setpoint {high_f}°F"),
                });
            }
            Ok(Plan {
                mutation: Mutation::Thermostat {
                    device_id: device_id.clone(),
                    patch: ThermostatPatch {
                        target_temperature_low_f: Some(*low_f),
                        target_temperature_high_f: Some(*high_f),
                        ..ThermostatPatch::default()
                    },
                },
                expected: vec![
                    (CommandField::TargetLow, DesiredValue::Temperature(*low_f)),
                    (CommandField::TargetHigh, DesiredValue::Temperature(*high_f)),
                ],
            })
        }
        Command::SetHvacMode { device_id, mode } => {
            require_thermostat(store, device_id)?;
            Ok(Plan {
                mutation: Mutation::Thermostat {
                    device_id: device_id.clone(),
                    patch: ThermostatPatch {
                        hvac_mode: Some(mode.to_string()),
                        ..ThermostatPatch::default()
                    },
                },
                expected: vec![(CommandField::HvacMode, DesiredValue::Mode(*mode))],
            })
        }
        Command::SetAway { structure_id, away } => {
            if store.structure(structure_id).is_none() {
                return Err(CoreError::StructureNotFound {
                    structure_id: structure_id.clone(),
                });
            }
            Ok(Plan {
                mutation: Mutation::Structure {
                    structure_id: structure_id.clone(),
                    patch: StructurePatch {
                        away: away.to_string(),
                    },
                },
                expected: vec![(CommandField::Away, DesiredValue::Away(*away))],
            })
        }
    }
}

fn require_thermostat(store: &DataStore, device_id: &str) -> Result<HvacMode, CoreError> {
    store
        .thermostat(device_id)
        .map(|device| device.hvac_mode)
        .ok_or_else(|| CoreError::ThermostatNotFound {
            device_id: device_id.to_owned(),
        })
}

/// Write the predicted result of `command` into the store.
pub(crate) fn apply_optimistic(store: &DataStore, command: &Command) -> bool {
    match command {
        Command::SetTargetTemperature { device_id, value_f } => {
            store.write_optimistic_thermostat(device_id, |d| d.target_temp_f = *value_f)
        }
        Command::SetTemperatureRange {
            device_id,
            low_f,
            high_f,
        } => store.write_optimistic_thermostat(device_id, |d| {
            d.target_low_f = *low_f;
            d.target_high_f = *high_f;
        }),
        Command::SetHvacMode { device_id, mode } => {
            store.write_optimistic_thermostat(device_id, |d| d.hvac_mode = *mode)
        }
        Command::SetAway { structure_id, away } => {
            store.write_optimistic_structure(structure_id, |s| s.away = *away)
        }
    }
}

// ── Derived display state ──
//
// What a thermostat face should show, computed from device + structure
// state. Pure data; rendering belongs to the consumer.

use std::fmt;

use serde::Serialize;

use super::structure::{AwayState, StructureSnapshot};
use super::thermostat::{DeviceSnapshot, HvacActivity, HvacMode};

/// Which control a consumer should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlLayout {
    /// Structure is away or auto-away; single control reading "away".
    Away,
    /// HVAC is off; single control reading "off".
    Off,
    /// Heat or cool; single setpoint.
    Single { target_f: i32 },
    /// Heat-cool; low and high setpoints.
    Range { low_f: i32, high_f: i32 },
}

impl fmt::Display for ControlLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Away => f.write_str("away"),
            Self::Off => f.write_str("off"),
            Self::Single { target_f } => write!(f, "{target_f}°F"),
            Self::Range { low_f, high_f } => write!(f, "{low_f}°F - {high_f}°F"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThermostatDisplay {
    pub device_id: String,
    pub name: String,
    pub structure_name: Option<String>,
    pub away: Option<AwayState>,
    pub hvac_mode: HvacMode,
    pub ambient_f: i32,
    pub layout: ControlLayout,
    pub activity: HvacActivity,
}

impl ThermostatDisplay {
    pub fn derive(device: &DeviceSnapshot, structure: Option<&StructureSnapshot>) -> Self {
        let away = structure.map(|s| s.away);
        let is_away = away.is_some_and(AwayState::is_away);

        let layout = if is_away {
            ControlLayout::Away
        } else {
            match device.hvac_mode {
                HvacMode::HeatCool => ControlLayout::Range {
                    low_f: device.target_low_f,
                    high_f: device.target_high_f,
                },
                HvacMode::Off => ControlLayout::Off,
                HvacMode::Heat | HvacMode::Cool => ControlLayout::Single {
                    target_f: device.target_temp_f,
                },
            }
        };

        let activity = if is_away {
            HvacActivity::Idle
        } else {
            device.activity()
        };

        Self {
            device_id: device.device_id.clone(),
            name: device.label().to_owned(),
            structure_name: structure.map(|s| s.name.clone()),
            away,
            hvac_mode: device.hvac_mode,
            ambient_f: device.ambient_temp_f,
            layout,
            activity,
        }
    }
}

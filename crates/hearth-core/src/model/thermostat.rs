// ── Thermostat domain types ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::Entity;

/// HVAC operating mode.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HvacMode {
    Heat,
    Cool,
    HeatCool,
    Off,
}

impl HvacMode {
    /// Range (low/high) setpoints are in effect.
    pub fn uses_range(self) -> bool {
        matches!(self, Self::HeatCool)
    }
}

/// What the equipment is doing relative to the setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HvacActivity {
    Heating,
    Cooling,
    Idle,
}

/// Latest known state of one thermostat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub name: Option<String>,
    pub structure_id: Option<String>,
    pub hvac_mode: HvacMode,
    pub ambient_temp_f: i32,
    pub target_temp_f: i32,
    pub target_low_f: i32,
    pub target_high_f: i32,
    pub revision: Option<u64>,
}

impl DeviceSnapshot {
    /// Display name, falling back to the device id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.device_id)
    }

    /// Heating/cooling inferred from mode, setpoints, and ambient temperature.
    ///
    /// Single-setpoint modes heat when the target is above ambient (`heat`)
    /// and cool when it is below (`cool`). In `heat-cool` the range decides:
    /// cooling when the high bound is below ambient, heating when the low
    /// bound is above it.
    pub fn activity(&self) -> HvacActivity {
        let ambient = self.ambient_temp_f;
        match self.hvac_mode {
            HvacMode::Heat if self.target_temp_f > ambient => HvacActivity::Heating,
            HvacMode::Cool if self.target_temp_f < ambient => HvacActivity::Cooling,
            HvacMode::HeatCool if self.target_high_f < ambient => HvacActivity::Cooling,
            HvacMode::HeatCool if self.target_low_f > ambient => HvacActivity::Heating,
            _ => HvacActivity::Idle,
        }
    }
}

impl Entity for DeviceSnapshot {
    fn key(&self) -> &str {
        &self.device_id
    }

    fn revision(&self) -> Option<u64> {
        self.revision
    }
}

// ── One-degree nudges ──
//
// Build the command for a single up/down press against the device's
// current state.

use super::Command;
use crate::error::CoreError;
use crate::model::{DeviceSnapshot, HvacMode};

impl Command {
    /// Move the single setpoint by `delta` degrees.
    pub fn step_target(device: &DeviceSnapshot, delta: i32) -> Result<Self, CoreError> {
        require_not_off(device)?;
        Ok(Self::SetTargetTemperature {
            device_id: device.device_id.clone(),
            value_f: device.target_temp_f + delta,
        })
    }

    /// Move the low bound of the range, keeping the high bound.
    pub fn step_low(device: &DeviceSnapshot, delta: i32) -> Result<Self, CoreError> {
        require_range(device)?;
        range(device, device.target_low_f + delta, device.target_high_f)
    }

    /// Move the high bound of the range, keeping the low bound.
    pub fn step_high(device: &DeviceSnapshot, delta: i32) -> Result<Self, CoreError> {
        require_range(device)?;
        range(device, device.target_low_f, device.target_high_f + delta)
    }
}

fn require_not_off(device: &DeviceSnapshot) -> Result<(), CoreError> {
    if device.hvac_mode == HvacMode::Off {
        return Err(CoreError::CommandRejected {
            reason: "cannot set temperature when HVAC mode is off".into(),
        });
    }
    Ok(())
}

fn require_range(device: &DeviceSnapshot) -> Result<(), CoreError> {
    require_not_off(device)?;
    if !device.hvac_mode.uses_range() {
        return Err(CoreError::CommandRejected {
            reason: format!("{} mode has a single setpoint", device.hvac_mode),
        });
    }
    Ok(())
}

fn range(device: &DeviceSnapshot, low_f: i32, high_f: i32) -> Result<Command, CoreError> {
    if low_f > high_f {
        return Err(CoreError::CommandRejected {
            reason: format!("low setpoint {low_f}°F would pass high setpoint {high_f}°F"),
        });
    }
    Ok(Command::SetTemperatureRange {
        device_id: device.device_id.clone(),
        low_f,
        high_f,
    })
}

// ── Wire → domain conversion ──
//
// Bridges raw `hearth-api` records into canonical domain types.
// Records with unknown enum values are rejected here so the store only
// ever holds validated state.

use std::str::FromStr;

use hearth_api::{SnapshotRecord, StructureRecord, ThermostatRecord};

use crate::error::CoreError;
use crate::model::{AwayState, DeviceSnapshot, HvacMode, Snapshots, StructureSnapshot};

impl TryFrom<ThermostatRecord> for DeviceSnapshot {
    type Error = CoreError;

    fn try_from(r: ThermostatRecord) -> Result<Self, Self::Error> {
        let hvac_mode = HvacMode::from_str(&r.hvac_mode).map_err(|_| {
            CoreError::Internal(format!(
                "thermostat {} reported unknown hvac_mode {:?}",
                r.device_id, r.hvac_mode
            ))
        })?;

        Ok(Self {
            device_id: r.device_id,
            name: r.name.filter(|n| !n.is_empty()),
            structure_id: r.structure_id,
            hvac_mode,
            ambient_temp_f: r.ambient_temperature_f,
            target_temp_f: r.target_temperature_f,
            target_low_f: r.target_temperature_low_f,
            target_high_f: r.target_temperature_high_f,
            revision: r.revision,
        })
    }
}

impl TryFrom<StructureRecord> for StructureSnapshot {
    type Error = CoreError;

    fn try_from(r: StructureRecord) -> Result<Self, Self::Error> {
        let away = AwayState::from_str(&r.away).map_err(|_| {
            CoreError::Internal(format!(
                "structure {} reported unknown away state {:?}",
                r.structure_id, r.away
            ))
        })?;

        Ok(Self {
            structure_id: r.structure_id,
            name: r.name,
            away,
            thermostat_ids: r.thermostats,
            revision: r.revision,
        })
    }
}

/// Convert a full state set, dropping (and logging) records that fail
/// validation instead of discarding the whole set.
impl From<SnapshotRecord> for Snapshots {
    fn from(r: SnapshotRecord) -> Self {
        let thermostats = r
            .thermostats
            .into_iter()
            .filter_map(|t| {
                DeviceSnapshot::try_from(t)
                    .map_err(|e| tracing::warn!(error = %e, "skipping thermostat record"))
                    .ok()
            })
            .collect();
        let structures = r
            .structures
            .into_iter()
            .filter_map(|s| {
                StructureSnapshot::try_from(s)
                    .map_err(|e| tracing::warn!(error = %e, "skipping structure record"))
                    .ok()
            })
            .collect();

        Self {
            thermostats,
            structures,
        }
    }
}

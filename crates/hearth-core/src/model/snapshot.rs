// ── Snapshot sets ──
//
// `Snapshots` is an inbound full state set (owned, straight from the
// feed). `SnapshotSet` is the merged view handed to consumers, cheap to
// clone because it shares the store's `Arc` snapshots.

use std::sync::Arc;

use super::display::ThermostatDisplay;
use super::structure::StructureSnapshot;
use super::thermostat::DeviceSnapshot;

/// A full state set as received from upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshots {
    pub thermostats: Vec<DeviceSnapshot>,
    pub structures: Vec<StructureSnapshot>,
}

/// Merged view of every known thermostat and structure.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSet {
    pub thermostats: Arc<Vec<Arc<DeviceSnapshot>>>,
    pub structures: Arc<Vec<Arc<StructureSnapshot>>>,
}

impl SnapshotSet {
    pub fn is_empty(&self) -> bool {
        self.thermostats.is_empty() && self.structures.is_empty()
    }

    pub fn thermostat(&self, device_id: &str) -> Option<&Arc<DeviceSnapshot>> {
        self.thermostats.iter().find(|t| t.device_id == device_id)
    }

    pub fn structure(&self, structure_id: &str) -> Option<&Arc<StructureSnapshot>> {
        self.structures
            .iter()
            .find(|s| s.structure_id == structure_id)
    }

    /// The structure a thermostat belongs to: its own `structure_id` when
    /// reported, otherwise whichever structure lists it.
    pub fn structure_for(&self, device: &DeviceSnapshot) -> Option<&Arc<StructureSnapshot>> {
        if let Some(id) = device.structure_id.as_deref() {
            if let Some(structure) = self.structure(id) {
                return Some(structure);
            }
        }
        self.structures
            .iter()
            .find(|s| s.thermostat_ids.iter().any(|t| *t == device.device_id))
    }

    /// First thermostat and its structure; what a single-device consumer shows.
    pub fn primary(&self) -> Option<(&Arc<DeviceSnapshot>, Option<&Arc<StructureSnapshot>>)> {
        let device = self.thermostats.first()?;
        Some((device, self.structure_for(device)))
    }

    /// Derived display state for every thermostat.
    pub fn displays(&self) -> Vec<ThermostatDisplay> {
        self.thermostats
            .iter()
            .map(|t| ThermostatDisplay::derive(t, self.structure_for(t).map(AsRef::as_ref)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::structure::AwayState;
    use crate::model::structure::tests::structure;
    use crate::model::thermostat::HvacMode;
    use crate::model::thermostat::tests::thermostat;

    fn set(devices: Vec<DeviceSnapshot>, structures: Vec<StructureSnapshot>) -> SnapshotSet {
        SnapshotSet {
            thermostats: Arc::new(devices.into_iter().map(Arc::new).collect()),
            structures: Arc::new(structures.into_iter().map(Arc::new).collect()),
        }
    }

    #[test]
    fn structure_for_prefers_reported_id() {
        let mut other = structure("s-2", AwayState::Away);
        other.thermostat_ids = vec!["t-1".into()];
        let snapshots = set(
            vec![thermostat("t-1", HvacMode::Heat)],
            vec![other, structure("s-1", AwayState::Home)],
        );
        let device = &snapshots.thermostats[0];
        assert_eq!(
            snapshots.structure_for(device).map(|s| s.structure_id.as_str()),
            Some("s-1")
        );
    }

    #[test]
    fn structure_for_falls_back_to_membership() {
        let mut device = thermostat("t-1", HvacMode::Heat);
        device.structure_id = None;
        let snapshots = set(vec![device], vec![structure("s-1", AwayState::Home)]);
        let (primary, home) = snapshots.primary().expect("one thermostat");
        assert_eq!(primary.device_id, "t-1");
        assert_eq!(home.map(|s| s.structure_id.as_str()), Some("s-1"));
    }

    #[test]
    fn empty_set_has_no_primary() {
        let snapshots = SnapshotSet::default();
        assert!(snapshots.is_empty());
        assert!(snapshots.primary().is_none());
        assert!(snapshots.displays().is_empty());
    }
}

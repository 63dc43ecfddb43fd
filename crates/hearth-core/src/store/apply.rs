// ── Inbound state application ──
//
// Applies feed snapshots and optimistic writes to the DataStore.
// Inbound state always wins over optimistic state; only a strictly
// older server revision is ignored.

use std::collections::HashSet;

use chrono::Utc;

use super::DataStore;
use super::collection::EntityCollection;
use crate::model::{DeviceSnapshot, Entity, Snapshots, StructureSnapshot};

/// Result of applying one inbound entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    /// Ignored: the stored revision is newer.
    Stale { stored: u64, incoming: u64 },
}

impl Applied {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Stale { .. })
    }
}

/// Apply all incoming entities, then prune any existing keys not in the
/// incoming set. This avoids the brief empty state that `clear()` causes.
fn apply_and_prune<T: Entity>(collection: &EntityCollection<T>, items: Vec<T>) {
    let incoming_keys: HashSet<String> = items.iter().map(|e| e.key().to_owned()).collect();
    for entity in items {
        if let Applied::Stale { stored, incoming } = collection.apply(entity) {
            tracing::debug!(stored, incoming, "snapshot entry older than stored state, kept stored");
        }
    }
    for existing_key in collection.keys() {
        if !incoming_keys.contains(&existing_key) {
            collection.remove(&existing_key);
        }
    }
}

impl DataStore {
    /// Replace the whole state with a full snapshot set.
    pub(crate) fn apply_snapshots(&self, snapshots: Snapshots) {
        apply_and_prune(&self.thermostats, snapshots.thermostats);
        apply_and_prune(&self.structures, snapshots.structures);
        self.touch();
    }

    pub(crate) fn apply_thermostat(&self, device: DeviceSnapshot) -> Applied {
        let id = device.device_id.clone();
        let applied = self.thermostats.apply(device);
        match applied {
            Applied::Stale { stored, incoming } => {
                tracing::debug!(device_id = %id, stored, incoming, "dropping stale thermostat update");
            }
            _ => self.touch(),
        }
        applied
    }

    pub(crate) fn apply_structure(&self, structure: StructureSnapshot) -> Applied {
        let id = structure.structure_id.clone();
        let applied = self.structures.apply(structure);
        match applied {
            Applied::Stale { stored, incoming } => {
                tracing::debug!(structure_id = %id, stored, incoming, "dropping stale structure update");
            }
            _ => self.touch(),
        }
        applied
    }

    /// Write a locally-predicted thermostat state. Keeps the stored
    /// revision so the next server update (same or newer) replaces it.
    pub(crate) fn write_optimistic_thermostat(
        &self,
        device_id: &str,
        edit: impl FnOnce(&mut DeviceSnapshot),
    ) -> bool {
        let Some(current) = self.thermostats.get(device_id) else {
            return false;
        };
        let mut next = DeviceSnapshot::clone(&current);
        edit(&mut next);
        next.revision = current.revision;
        self.thermostats.upsert(next);
        true
    }

    pub(crate) fn write_optimistic_structure(
        &self,
        structure_id: &str,
        edit: impl FnOnce(&mut StructureSnapshot),
    ) -> bool {
        let Some(current) = self.structures.get(structure_id) else {
            return false;
        };
        let mut next = StructureSnapshot::clone(&current);
        edit(&mut next);
        next.revision = current.revision;
        self.structures.upsert(next);
        true
    }

    fn touch(&self) {
        self.last_update.send_replace(Some(Utc::now()));
    }
}

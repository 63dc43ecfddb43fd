// ── Central reactive data store ──
//
// Thread-safe storage for thermostat and structure state.
// Mutations are broadcast to subscribers via `watch` channels.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::EntityCollection;
use crate::model::{DeviceSnapshot, SnapshotSet, StructureSnapshot};
use crate::stream::EntityStream;

/// Central reactive store for device-session state.
///
/// Reads are cheap `Arc` clones; writes come only from the session's
/// processor task. Mutations are broadcast to subscribers via `watch`
/// channels.
pub struct DataStore {
    pub(crate) thermostats: EntityCollection<DeviceSnapshot>,
    pub(crate) structures: EntityCollection<StructureSnapshot>,
    pub(crate) last_update: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        let (last_update, _) = watch::channel(None);

        Self {
            thermostats: EntityCollection::new(),
            structures: EntityCollection::new(),
            last_update,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn thermostats_snapshot(&self) -> Arc<Vec<Arc<DeviceSnapshot>>> {
        self.thermostats.snapshot()
    }

    pub fn structures_snapshot(&self) -> Arc<Vec<Arc<StructureSnapshot>>> {
        self.structures.snapshot()
    }

    /// Merged view of everything currently known.
    pub fn snapshot_set(&self) -> SnapshotSet {
        SnapshotSet {
            thermostats: self.thermostats.snapshot(),
            structures: self.structures.snapshot(),
        }
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn thermostat(&self, device_id: &str) -> Option<Arc<DeviceSnapshot>> {
        self.thermostats.get(device_id)
    }

    pub fn structure(&self, structure_id: &str) -> Option<Arc<StructureSnapshot>> {
        self.structures.get(structure_id)
    }

    pub fn thermostat_count(&self) -> usize {
        self.thermostats.len()
    }

    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thermostats.is_empty() && self.structures.is_empty()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_thermostats(&self) -> EntityStream<DeviceSnapshot> {
        EntityStream::new(self.thermostats.subscribe())
    }

    pub fn subscribe_structures(&self) -> EntityStream<StructureSnapshot> {
        EntityStream::new(self.structures.subscribe())
    }

    // ── Freshness ────────────────────────────────────────────────────

    /// When inbound state was last applied.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.borrow()
    }

    /// Time since the last inbound update.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_update().map(|t| Utc::now() - t)
    }

    /// Count of changes across both collections. Moves on every applied
    /// update or optimistic write and never on a discarded stale one.
    pub fn version(&self) -> u64 {
        self.thermostats.version() + self.structures.version()
    }

    pub(crate) fn clear(&self) {
        self.thermostats.clear();
        self.structures.clear();
        self.last_update.send_replace(None);
    }
}

// ── Generic reactive entity collection ──
//
// Concurrent storage with O(1) lookups and push-based change
// notification via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use super::apply::Applied;
use crate::model::Entity;

/// A concurrent, reactive collection for a single entity type.
///
/// Uses `DashMap` for O(1) concurrent lookups and `watch` channels
/// for push-based change notification. Every mutation bumps a version
/// counter and rebuilds the key-ordered snapshot subscribers receive.
pub(crate) struct EntityCollection<T: Entity> {
    /// Entity id -> entity.
    by_key: DashMap<String, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Entity> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Apply an inbound entity unless it is older than what is stored.
    ///
    /// An entity is stale only when both sides carry a revision and the
    /// incoming one is strictly lower. Everything else wins by arrival.
    pub(crate) fn apply(&self, entity: T) -> Applied {
        let outcome = match self.by_key.entry(entity.key().to_owned()) {
            Entry::Occupied(mut slot) => {
                if let (Some(incoming), Some(stored)) = (entity.revision(), slot.get().revision())
                {
                    if incoming < stored {
                        return Applied::Stale { stored, incoming };
                    }
                }
                slot.insert(Arc::new(entity));
                Applied::Updated
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(entity));
                Applied::Inserted
            }
        };

        self.rebuild_snapshot();
        self.bump_version();
        outcome
    }

    /// Insert or replace unconditionally. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, entity: T) -> bool {
        let is_new = self
            .by_key
            .insert(entity.key().to_owned(), Arc::new(entity))
            .is_none();

        self.rebuild_snapshot();
        self.bump_version();

        is_new
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
            self.bump_version();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    /// Remove all entities.
    pub(crate) fn clear(&self) {
        self.by_key.clear();
        self.rebuild_snapshot();
        self.bump_version();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Return all current keys in the collection.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all values into a key-ordered vec and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.key().cmp(b.key()));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::HvacMode;
    use crate::model::thermostat::tests::thermostat;

    fn revised(id: &str, target: i32, revision: Option<u64>) -> crate::model::DeviceSnapshot {
        let mut t = thermostat(id, HvacMode::Heat);
        t.target_temp_f = target;
        t.revision = revision;
        t
    }

    #[test]
    fn upsert_returns_true_for_new_key() {
        let col = EntityCollection::new();
        assert!(col.upsert(revised("t-1", 70, None)));
        assert!(!col.upsert(revised("t-1", 71, None)));
        assert_eq!(col.get("t-1").unwrap().target_temp_f, 71);
    }

    #[test]
    fn apply_discards_strictly_older_revision() {
        let col = EntityCollection::new();
        assert_eq!(col.apply(revised("t-1", 70, Some(5))), Applied::Inserted);
        assert_eq!(
            col.apply(revised("t-1", 60, Some(4))),
            Applied::Stale {
                stored: 5,
                incoming: 4
            }
        );
        assert_eq!(col.get("t-1").unwrap().target_temp_f, 70);

        assert_eq!(col.apply(revised("t-1", 68, Some(5))), Applied::Updated);
        assert_eq!(col.get("t-1").unwrap().target_temp_f, 68);
    }

    #[test]
    fn apply_without_revisions_is_last_arrival_wins() {
        let col = EntityCollection::new();
        col.apply(revised("t-1", 70, Some(9)));
        assert_eq!(col.apply(revised("t-1", 65, None)), Applied::Updated);
        assert_eq!(col.get("t-1").unwrap().target_temp_f, 65);
    }

    #[test]
    fn stale_apply_does_not_bump_version() {
        let col = EntityCollection::new();
        col.apply(revised("t-1", 70, Some(2)));
        let before = col.version();
        col.apply(revised("t-1", 71, Some(1)));
        assert_eq!(col.version(), before);
    }

    #[test]
    fn snapshot_is_key_ordered() {
        let col = EntityCollection::new();
        col.upsert(revised("t-b", 70, None));
        col.upsert(revised("t-a", 70, None));
        col.upsert(revised("t-c", 70, None));

        let keys: Vec<String> = col.snapshot().iter().map(|t| t.device_id.clone()).collect();
        assert_eq!(keys, ["t-a", "t-b", "t-c"]);
    }

    #[test]
    fn remove_and_clear() {
        let col = EntityCollection::new();
        col.upsert(revised("a", 70, None));
        col.upsert(revised("b", 70, None));
        assert_eq!(col.len(), 2);

        assert!(col.remove("a").is_some());
        assert!(col.remove("a").is_none());
        assert_eq!(col.keys(), ["b"]);

        col.clear();
        assert!(col.is_empty());
        assert!(col.snapshot().is_empty());
    }
}

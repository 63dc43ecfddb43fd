// ── Pending command tracking ──
//
// A dispatched command stays pending until an inbound snapshot shows the
// desired value or the pending window elapses. Tracking never blocks a
// command and never rolls anything back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use super::{CommandField, DesiredValue};
use crate::model::{DeviceSnapshot, StructureSnapshot};

/// A command waiting for the server to reflect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingCommand {
    pub id: u64,
    /// Thermostat or structure id.
    pub target: String,
    pub field: CommandField,
    pub desired: DesiredValue,
    pub issued_at: DateTime<Utc>,
}

impl PendingCommand {
    fn reflected_by_thermostat(&self, device: &DeviceSnapshot) -> bool {
        if self.target != device.device_id {
            return false;
        }
        match (self.field, self.desired) {
            (CommandField::TargetTemperature, DesiredValue::Temperature(v)) => {
                device.target_temp_f == v
            }
            (CommandField::TargetLow, DesiredValue::Temperature(v)) => device.target_low_f == v,
            (CommandField::TargetHigh, DesiredValue::Temperature(v)) => device.target_high_f == v,
            (CommandField::HvacMode, DesiredValue::Mode(mode)) => device.hvac_mode == mode,
            _ => false,
        }
    }

    fn reflected_by_structure(&self, structure: &StructureSnapshot) -> bool {
        self.target == structure.structure_id
            && matches!(
                (self.field, self.desired),
                (CommandField::Away, DesiredValue::Away(away)) if structure.away == away
            )
    }
}

/// Pending set, published through a `watch` channel on every change.
pub(crate) struct PendingCommands {
    next_id: AtomicU64,
    entries: Mutex<Vec<PendingCommand>>,
    published: watch::Sender<Arc<Vec<PendingCommand>>>,
}

impl PendingCommands {
    pub(crate) fn new() -> Self {
        let (published, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
            published,
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<PendingCommand>>> {
        self.published.subscribe()
    }

    pub(crate) fn current(&self) -> Arc<Vec<PendingCommand>> {
        Arc::clone(&self.published.borrow())
    }

    /// Start tracking one entry per expected field. Returns the new ids.
    pub(crate) fn track(
        &self,
        target: &str,
        expected: &[(CommandField, DesiredValue)],
        issued_at: DateTime<Utc>,
    ) -> Vec<u64> {
        let mut entries = self.lock();
        let ids = expected
            .iter()
            .map(|&(field, desired)| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                entries.push(PendingCommand {
                    id,
                    target: target.to_owned(),
                    field,
                    desired,
                    issued_at,
                });
                id
            })
            .collect();
        self.publish(&entries);
        ids
    }

    /// Clear entries the inbound thermostat state satisfies.
    pub(crate) fn reconcile_thermostat(&self, device: &DeviceSnapshot) -> usize {
        self.retain(|p| !p.reflected_by_thermostat(device))
    }

    /// Clear entries the inbound structure state satisfies.
    pub(crate) fn reconcile_structure(&self, structure: &StructureSnapshot) -> usize {
        self.retain(|p| !p.reflected_by_structure(structure))
    }

    /// Drop entries issued more than `timeout` before `now`.
    pub(crate) fn expire(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> usize {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|p| {
            let keep = now.signed_duration_since(p.issued_at) < timeout;
            if !keep {
                debug!(
                    target_id = %p.target,
                    field = %p.field,
                    desired = %p.desired,
                    "pending command expired without a reflecting snapshot"
                );
            }
            keep
        });
        let expired = before - entries.len();
        if expired > 0 {
            self.publish(&entries);
        }
        expired
    }

    pub(crate) fn remove(&self, ids: &[u64]) -> usize {
        self.retain(|p| !ids.contains(&p.id))
    }

    pub(crate) fn clear(&self) {
        let mut entries = self.lock();
        if !entries.is_empty() {
            entries.clear();
            self.publish(&entries);
        }
    }

    fn retain(&self, keep: impl FnMut(&PendingCommand) -> bool) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(keep);
        let removed = before - entries.len();
        if removed > 0 {
            self.publish(&entries);
        }
        removed
    }

    fn publish(&self, entries: &[PendingCommand]) {
        self.published.send_replace(Arc::new(entries.to_vec()));
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingCommand>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Domain model ──
//
// Canonical, validated representations of what the upstream API reports.
// Consumers (CLI, embedders) depend on these, never on wire records.

pub mod display;
pub mod snapshot;
pub mod structure;
pub mod thermostat;

// ── Re-exports ──────────────────────────────────────────────────────

pub use display::{ControlLayout, ThermostatDisplay};
pub use snapshot::{SnapshotSet, Snapshots};
pub use structure::{AwayState, StructureSnapshot};
pub use thermostat::{DeviceSnapshot, HvacActivity, HvacMode};

/// Something the store can key and order.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Stable identifier (device or structure id).
    fn key(&self) -> &str;

    /// Server-assigned per-entity revision, when the server provides one.
    fn revision(&self) -> Option<u64>;
}

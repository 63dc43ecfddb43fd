// ── Reactive data store ──
//
// Concurrent entity storage with push-based change notification.

mod apply;
mod collection;
mod data_store;

pub use apply::Applied;
pub use data_store::DataStore;

// ── Update stream ──
//
// Bridges the upstream feed to exactly one handler. The handler slot is
// swapped atomically on re-subscribe; a generation id lets a stale
// `SubscriptionHandle` release itself without touching its successor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use hearth_api::{Credential, Feed, FeedMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{DeviceSnapshot, Snapshots, StructureSnapshot};
use crate::upstream::DeviceApi;

// ── StreamUpdate ─────────────────────────────────────────────────────

/// Feed connectivity transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    /// The feed dropped or cannot connect. Last-known state stays valid.
    Degraded { reason: String },
    /// The feed is back. A full resync follows.
    Restored,
}

/// One item delivered to the subscribed handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// First full snapshot set after [`UpdateStream::open`].
    Initial(Snapshots),
    /// Full snapshot set after a reconnect.
    Resync(Snapshots),
    /// One thermostat changed.
    Thermostat(DeviceSnapshot),
    /// One structure changed.
    Structure(StructureSnapshot),
    Connectivity(Connectivity),
    /// The server revoked the credential. Nothing follows.
    AuthRevoked,
}

// ── Handler slot ─────────────────────────────────────────────────────

type Handler = Arc<dyn Fn(StreamUpdate) + Send + Sync>;

struct ActiveHandler {
    generation: u64,
    handler: Handler,
}

type Slot = Mutex<Option<ActiveHandler>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hand one update to the current handler, if any. The handler runs
/// outside the slot lock so it may re-subscribe.
fn deliver(slot: &Slot, update: StreamUpdate) {
    let handler = lock(slot).as_ref().map(|active| Arc::clone(&active.handler));
    match handler {
        Some(handler) => handler(update),
        None => debug!(?update, "no subscriber, dropping update"),
    }
}

// ── SubscriptionHandle ───────────────────────────────────────────────

/// Scoped registration returned by [`UpdateStream::subscribe`].
///
/// Dropping the handle unsubscribes, unless a newer subscription has
/// already replaced it.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct SubscriptionHandle {
    generation: u64,
    slot: Weak<Slot>,
}

impl SubscriptionHandle {
    /// `true` while this handle's handler is the one receiving updates.
    pub fn is_active(&self) -> bool {
        self.slot.upgrade().is_some_and(|slot| {
            lock(&slot)
                .as_ref()
                .is_some_and(|active| active.generation == self.generation)
        })
    }

    pub fn release(self) {}
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            let mut guard = lock(&slot);
            if guard
                .as_ref()
                .is_some_and(|active| active.generation == self.generation)
            {
                *guard = None;
            }
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

// ── UpdateStream ─────────────────────────────────────────────────────

/// Live subscription to device-state changes.
///
/// Holds at most one upstream feed and at most one handler. Updates for a
/// given entity reach the handler in arrival order.
pub struct UpdateStream {
    slot: Arc<Slot>,
    generation: AtomicU64,
    feed: Mutex<Option<CancellationToken>>,
}

impl Default for UpdateStream {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateStream {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
            feed: Mutex::new(None),
        }
    }

    /// Register `handler` as the only receiver of updates, replacing any
    /// previous one. Nothing is replayed to the new handler.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(StreamUpdate) + Send + Sync + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = lock(&self.slot).replace(ActiveHandler {
            generation,
            handler: Arc::new(handler),
        });
        if previous.is_some() {
            debug!(generation, "replaced update handler");
        }

        SubscriptionHandle {
            generation,
            slot: Arc::downgrade(&self.slot),
        }
    }

    /// [`subscribe`](Self::subscribe) with a channel as the handler.
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<StreamUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(move |update| {
            let _ = tx.send(update);
        });
        (handle, rx)
    }

    pub fn has_subscriber(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Open the upstream feed for `credential`, closing any feed already
    /// open. The feed stops when `cancel` fires.
    pub async fn open(
        &self,
        api: &dyn DeviceApi,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        self.close_feed();

        let feed_cancel = cancel.child_token();
        let feed = api.open_feed(credential, feed_cancel.clone()).await?;
        *lock(&self.feed) = Some(feed_cancel.clone());

        let slot = Arc::clone(&self.slot);
        tokio::spawn(async move {
            bridge(feed, slot, feed_cancel).await;
        });

        info!("update stream opened");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        lock(&self.feed)
            .as_ref()
            .is_some_and(|cancel| !cancel.is_cancelled())
    }

    /// Drop the handler and close the feed. Safe to call repeatedly.
    pub fn unsubscribe_all(&self) {
        let had_handler = lock(&self.slot).take().is_some();
        let had_feed = self.close_feed();
        if had_handler || had_feed {
            debug!(had_handler, had_feed, "update stream torn down");
        }
    }

    fn close_feed(&self) -> bool {
        match lock(&self.feed).take() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for UpdateStream {
    fn drop(&mut self) {
        self.close_feed();
    }
}

// ── Feed bridge ──────────────────────────────────────────────────────

/// Translate feed messages into updates until cancelled, revoked, or the
/// feed gives up.
async fn bridge(mut feed: Feed, slot: Arc<Slot>, cancel: CancellationToken) {
    let mut seen_snapshot = false;
    let mut degraded = false;

    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = feed.recv() => message,
        };

        let Some(message) = message else {
            warn!("feed stopped");
            deliver(
                &slot,
                StreamUpdate::Connectivity(Connectivity::Degraded {
                    reason: "feed stopped".into(),
                }),
            );
            break;
        };

        let update = match message {
            FeedMessage::Snapshot(record) => {
                let snapshots = Snapshots::from(record);
                if seen_snapshot {
                    StreamUpdate::Resync(snapshots)
                } else {
                    seen_snapshot = true;
                    StreamUpdate::Initial(snapshots)
                }
            }
            FeedMessage::Thermostat(record) => match DeviceSnapshot::try_from(record) {
                Ok(device) => StreamUpdate::Thermostat(device),
                Err(e) => {
                    warn!(error = %e, "ignoring thermostat update");
                    continue;
                }
            },
            FeedMessage::Structure(record) => match StructureSnapshot::try_from(record) {
                Ok(structure) => StreamUpdate::Structure(structure),
                Err(e) => {
                    warn!(error = %e, "ignoring structure update");
                    continue;
                }
            },
            FeedMessage::Connected => {
                if !degraded {
                    continue;
                }
                degraded = false;
                StreamUpdate::Connectivity(Connectivity::Restored)
            }
            FeedMessage::Disconnected { reason } => {
                degraded = true;
                StreamUpdate::Connectivity(Connectivity::Degraded { reason })
            }
            FeedMessage::AuthRevoked => {
                deliver(&slot, StreamUpdate::AuthRevoked);
                break;
            }
        };

        deliver(&slot, update);
    }

    debug!("feed bridge exiting");
}

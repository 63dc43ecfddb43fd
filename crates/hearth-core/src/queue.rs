// ── Session event queue ──
//
// Every state transition of a running session enters through this one
// channel and is applied by a single processor task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};

use crate::command::CommandEnvelope;
use crate::error::CoreError;
use crate::stream::StreamUpdate;

pub(crate) type InputSender = mpsc::UnboundedSender<Input>;
pub(crate) type InputReceiver = mpsc::UnboundedReceiver<Input>;

/// One unit of work for the processor.
pub(crate) enum Input {
    Update(StreamUpdate),
    Command(CommandEnvelope),
    /// A dispatched command finished upstream.
    Completed {
        pending_ids: Vec<u64>,
        result: Result<(), CoreError>,
        response_tx: oneshot::Sender<Result<(), CoreError>>,
    },
}

/// Swappable sender side of the queue.
///
/// Each session run gets a fresh channel, so producers that captured a
/// previous run's sender can never feed a later run.
#[derive(Clone, Default)]
pub(crate) struct EventQueue {
    tx: Arc<Mutex<Option<InputSender>>>,
}

impl EventQueue {
    /// Replace the channel and return the new receiver.
    pub(crate) fn open(&self) -> (InputSender, InputReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock() = Some(tx.clone());
        (tx, rx)
    }

    /// Stop accepting input until the next `open`.
    pub(crate) fn close(&self) {
        self.lock().take();
    }

    /// Close only if `tx` is still the current sender.
    pub(crate) fn close_if(&self, tx: &InputSender) {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|current| current.same_channel(tx)) {
            current.take();
        }
    }

    /// Hands the input back if no session is running.
    pub(crate) fn push(&self, input: Input) -> Result<(), Input> {
        let Some(tx) = self.lock().clone() else {
            return Err(input);
        };
        tx.send(input).map_err(|e| e.0)
    }

    fn lock(&self) -> MutexGuard<'_, Option<InputSender>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::stream::Connectivity;

    fn restored() -> Input {
        Input::Update(StreamUpdate::Connectivity(Connectivity::Restored))
    }

    #[test]
    fn push_fails_until_opened() {
        let queue = EventQueue::default();
        assert!(queue.push(restored()).is_err());

        let (_tx, mut rx) = queue.open();
        assert!(queue.push(restored()).is_ok());
        assert!(matches!(rx.try_recv().unwrap(), Input::Update(_)));

        queue.close();
        assert!(queue.push(restored()).is_err());
    }

    #[test]
    fn close_if_leaves_newer_channel_open() {
        let queue = EventQueue::default();
        let (old_tx, _old_rx) = queue.open();
        let (tx, mut rx) = queue.open();

        queue.close_if(&old_tx);
        assert!(queue.push(restored()).is_ok());
        assert!(rx.try_recv().is_ok());

        queue.close_if(&tx);
        assert!(queue.push(restored()).is_err());
    }

    #[test]
    fn reopen_detaches_old_receiver() {
        let queue = EventQueue::default();
        let (old_tx, mut old_rx) = queue.open();
        let (_tx, mut rx) = queue.open();

        queue.push(restored()).ok();
        assert!(old_rx.try_recv().is_err());
        assert!(rx.try_recv().is_ok());

        // Producers holding the old sender stay on the old channel.
        old_tx.send(restored()).ok();
        assert!(old_rx.try_recv().is_ok());
    }
}

// ── Command dispatcher ──
//
// Cheap cloneable handle that queues commands to the running session.
// Never waits for an acknowledgment; completion arrives on the ticket.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};

use super::{Command, CommandEnvelope, PendingCommand};
use crate::error::CoreError;
use crate::model::{AwayState, HvacMode};
use crate::queue::{EventQueue, Input};

/// Completion signal for one queued command.
#[derive(Debug)]
#[must_use = "a ticket reports the command's outcome"]
pub struct CommandTicket {
    rx: oneshot::Receiver<Result<(), CoreError>>,
}

impl CommandTicket {
    /// Wait for the outcome.
    ///
    /// `None` means the session was torn down before the command
    /// finished; the result was dropped rather than failed.
    pub async fn completion(self) -> Option<Result<(), CoreError>> {
        self.rx.await.ok()
    }
}

/// Issues commands against the current session.
#[derive(Clone)]
pub struct CommandDispatcher {
    queue: EventQueue,
    pending: watch::Receiver<Arc<Vec<PendingCommand>>>,
}

impl CommandDispatcher {
    pub(crate) fn new(
        queue: EventQueue,
        pending: watch::Receiver<Arc<Vec<PendingCommand>>>,
    ) -> Self {
        Self { queue, pending }
    }

    /// Queue `command`. Fails only when no session is running.
    pub fn send(&self, command: Command) -> Result<CommandTicket, CoreError> {
        let (response_tx, rx) = oneshot::channel();
        self.queue
            .push(Input::Command(CommandEnvelope {
                command,
                response_tx,
            }))
            .map_err(|_| CoreError::SessionClosed)?;
        Ok(CommandTicket { rx })
    }

    /// Queue `command` and wait for its outcome.
    pub async fn execute(&self, command: Command) -> Result<(), CoreError> {
        self.send(command)?
            .completion()
            .await
            .unwrap_or(Err(CoreError::SessionClosed))
    }

    pub fn set_temperature(
        &self,
        device_id: impl Into<String>,
        value_f: i32,
    ) -> Result<CommandTicket, CoreError> {
        self.send(Command::SetTargetTemperature {
            device_id: device_id.into(),
            value_f,
        })
    }

    pub fn set_temperature_range(
        &self,
        device_id: impl Into<String>,
        low_f: i32,
        high_f: i32,
    ) -> Result<CommandTicket, CoreError> {
        self.send(Command::SetTemperatureRange {
            device_id: device_id.into(),
            low_f,
            high_f,
        })
    }

    pub fn set_mode(
        &self,
        device_id: impl Into<String>,
        mode: HvacMode,
    ) -> Result<CommandTicket, CoreError> {
        self.send(Command::SetHvacMode {
            device_id: device_id.into(),
            mode,
        })
    }

    pub fn set_away(
        &self,
        structure_id: impl Into<String>,
        away: AwayState,
    ) -> Result<CommandTicket, CoreError> {
        self.send(Command::SetAway {
            structure_id: structure_id.into(),
            away,
        })
    }

    /// Commands dispatched but not yet reflected by the server.
    pub fn pending(&self) -> Arc<Vec<PendingCommand>> {
        Arc::clone(&self.pending.borrow())
    }

    pub fn subscribe_pending(&self) -> watch::Receiver<Arc<Vec<PendingCommand>>> {
        self.pending.clone()
    }
}
